use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::Slice;

/// Addresses carved out of the IPAM pools for one slice. All values are in
/// CIDR form `a.b.c.d/len`; `session_subnets` is ordered like the slice's
/// session list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressValue {
    pub session_subnets: Vec<String>,
    pub upf_n3_addr: String,
    pub upf_n4_addr: String,
    pub smf_n3_addr: String,
    pub smf_n4_addr: String,
}

/// Persisted form of a slice: the operator-supplied definition paired with the
/// addresses it owns. The addresses are freed iff the record is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub slice: Slice,
    pub address: AddressValue,
}

impl SliceRecord {
    pub fn new(slice: Slice, address: AddressValue) -> Self {
        Self {
            id: None,
            slice,
            address,
        }
    }

    pub fn slice_id(&self) -> String {
        self.slice.slice_id()
    }
}
