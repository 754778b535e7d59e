use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::strategy::{Strategy, METRICS_STEP, METRICS_WINDOW};
use crate::config::AiConfig;
use crate::services::metrics::Metrics;
use crate::types::{Play, Sla};

pub const METRICS_TOOL_NAME: &str = "Metrics Fetcher";

/// The agent gets a bounded number of reasoning steps before the attempt is
/// abandoned.
const MAX_AGENT_STEPS: usize = 10;

const STRATEGY_PROMPT: &str = r#"You are a network slice policy optimizer. Given an SLA and the current metric windows, produce a new Play based on the existing one.

The Play schema:
  Play { id, slice_id, resources: ResourceSpec, bandwidth: BandwidthSpec, priority, scheduling: SchedulingSpec, network_policy, annotations }
  ResourceSpec { cpu_request (e.g. "500m"), cpu_limit (e.g. "1"), memory_request (e.g. "512Mi"), memory_limit (e.g. "1Gi") }
  BandwidthSpec { ingress (e.g. "100M"), egress (e.g. "200M") }
  SchedulingSpec { scheduler_name, node_name, node_selector }

The SLA schema:
  Sla { id, slice_id, up_bandwidth (Mbps), down_bandwidth (Mbps), latency (ms), availability (percent, e.g. 99.9) }

The metrics schema:
  UsedMetrics { up_throughput: [float], down_throughput: [float], latency: [float], availability: [float] }

Adjust the Play's bandwidth and resource requests/limits so the observed metrics satisfy the SLA. Keep id and slice_id unchanged."#;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported model type {0:?}")]
    UnsupportedModelType(String),
    #[error("agent exceeded {0} steps")]
    StepLimit(usize),
    #[error("agent timed out")]
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub spec_type: String,
    pub function: ToolFunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolFunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "slice_is_empty")]
    tools: &'a [ToolSpec],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

fn slice_is_empty<T>(slice: &&[T]) -> bool {
    slice.is_empty()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Function-calling chat capability; mocked in tests with canned replies.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatMessage, AiError>;
}

/// OpenAI-compatible chat completions client. DeepSeek exposes the same
/// surface, so one client covers both model types.
pub struct OpenAiChatModel {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiChatModel {
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let default_base = match config.model_type.as_str() {
            "openai" => "https://api.openai.com",
            "deepseek" => "https://api.deepseek.com",
            other => return Err(AiError::UnsupportedModelType(other.to_string())),
        };
        let base_url = if config.base_url.is_empty() {
            default_base.to_string()
        } else {
            config.base_url.clone()
        };

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AiError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: (config.max_tokens > 0).then_some(config.max_tokens),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatMessage, AiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            tools,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AiError::Parse("response carried no choices".to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MetricsToolParams {
    slice_id: String,
    /// Seconds.
    duration: u64,
    /// Seconds.
    step: u64,
}

/// The one tool the agent may call: fetch the used metrics of a slice as
/// JSON.
pub struct MetricsTool {
    metrics: Arc<dyn Metrics>,
}

impl MetricsTool {
    pub fn new(metrics: Arc<dyn Metrics>) -> Self {
        Self { metrics }
    }

    pub fn describe(&self) -> ToolSpec {
        ToolSpec {
            spec_type: "function".to_string(),
            function: ToolFunctionSpec {
                name: METRICS_TOOL_NAME.to_string(),
                description: "Fetch the observed metric windows of a slice".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "slice_id": {
                            "type": "string",
                            "description": "Slice identifier, e.g. 1-000001"
                        },
                        "duration": {
                            "type": "integer",
                            "description": "Window length in seconds"
                        },
                        "step": {
                            "type": "integer",
                            "description": "Sample interval in seconds"
                        }
                    },
                    "required": ["slice_id", "duration", "step"]
                }),
            },
        }
    }

    pub async fn invoke(&self, arguments: &str) -> anyhow::Result<String> {
        let params: MetricsToolParams = serde_json::from_str(arguments)?;
        let metrics = self
            .metrics
            .used_metrics(
                &params.slice_id,
                Duration::from_secs(params.duration),
                Duration::from_secs(params.step),
            )
            .await?;
        Ok(serde_json::to_string(&metrics)?)
    }
}

/// LLM-backed strategy: seeds a conversation with the schemas, the current
/// Play/SLA and a fresh metrics window, then lets the agent call the metrics
/// tool until it emits the new Play as JSON.
pub struct AiStrategy {
    model: Arc<dyn ChatModel>,
    tool: MetricsTool,
    timeout: Duration,
}

impl AiStrategy {
    pub fn new(model: Arc<dyn ChatModel>, metrics: Arc<dyn Metrics>, timeout: Duration) -> Self {
        Self {
            model,
            tool: MetricsTool::new(metrics),
            timeout,
        }
    }

    async fn run_agent(&self, current: &Play, sla: &Sla) -> anyhow::Result<Play> {
        let metrics_args = serde_json::to_string(&MetricsToolParams {
            slice_id: current.slice_id.clone(),
            duration: METRICS_WINDOW.as_secs(),
            step: METRICS_STEP.as_secs(),
        })?;
        let metrics_json = self.tool.invoke(&metrics_args).await?;

        let mut messages = vec![
            ChatMessage::system(STRATEGY_PROMPT),
            ChatMessage::system(
                "Constraints: never drop the current Play; modify it. Only the resource \
                 requests/limits and the bandwidth limits may change.",
            ),
            ChatMessage::user(format!(
                "Current Play: {}",
                serde_json::to_string(current)?
            )),
            ChatMessage::user(format!("Current metrics: {}", metrics_json)),
            ChatMessage::user(format!("Current SLA: {}", serde_json::to_string(sla)?)),
            ChatMessage::user(
                "Produce the new Play for this slice. Return only the Play as JSON, with no \
                 surrounding prose.",
            ),
        ];

        let tools = [self.tool.describe()];

        for _ in 0..MAX_AGENT_STEPS {
            let reply = self.model.chat(&messages, &tools).await?;

            if let Some(calls) = reply.tool_calls.clone().filter(|c| !c.is_empty()) {
                messages.push(reply);
                for call in calls {
                    let output = if call.function.name == METRICS_TOOL_NAME {
                        match self.tool.invoke(&call.function.arguments).await {
                            Ok(out) => out,
                            Err(e) => format!("tool error: {}", e),
                        }
                    } else {
                        format!("unknown tool {:?}", call.function.name)
                    };
                    messages.push(ChatMessage::tool(call.id, output));
                }
                continue;
            }

            let content = reply
                .content
                .ok_or_else(|| AiError::Parse("reply had no content".to_string()))?;
            let mut play: Play = serde_json::from_str(strip_code_fences(&content))
                .map_err(|e| AiError::Parse(e.to_string()))?;

            // The agent is told to keep these; pin them regardless.
            play.id = current.id;
            play.slice_id = current.slice_id.clone();
            return Ok(play);
        }

        Err(AiError::StepLimit(MAX_AGENT_STEPS).into())
    }
}

#[async_trait]
impl Strategy for AiStrategy {
    fn name(&self) -> &str {
        "ai"
    }

    async fn reconcile(&self, current: Play, sla: Sla) -> anyhow::Result<Play> {
        if current.slice_id.is_empty() {
            anyhow::bail!("play has no slice id");
        }

        match tokio::time::timeout(self.timeout, self.run_agent(&current, &sla)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout.into()),
        }
    }
}

/// Models habitually wrap JSON in markdown fences even when told not to.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metrics::UsedMetrics;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeMetrics;

    #[async_trait]
    impl Metrics for FakeMetrics {
        async fn used_metrics(
            &self,
            _slice_id: &str,
            _duration: Duration,
            _step: Duration,
        ) -> anyhow::Result<UsedMetrics> {
            Ok(UsedMetrics {
                up_throughput: vec![90.0],
                down_throughput: vec![150.0],
                latency: vec![],
                availability: vec![99.99],
            })
        }
    }

    struct FakeChatModel {
        replies: Mutex<VecDeque<ChatMessage>>,
        seen: Mutex<Vec<usize>>,
    }

    impl FakeChatModel {
        fn new(replies: Vec<ChatMessage>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for FakeChatModel {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ChatMessage, AiError> {
            self.seen.lock().unwrap().push(messages.len());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AiError::Parse("fake ran out of replies".to_string()))
        }
    }

    fn test_play() -> Play {
        Play {
            id: Some(mongodb::bson::oid::ObjectId::new()),
            slice_id: "1-000001".to_string(),
            resources: crate::types::ResourceSpec {
                cpu_request: "500m".to_string(),
                cpu_limit: "1".to_string(),
                memory_request: "512Mi".to_string(),
                memory_limit: "1Gi".to_string(),
            },
            bandwidth: crate::types::BandwidthSpec {
                ingress: "100M".to_string(),
                egress: "200M".to_string(),
            },
            priority: 0,
            scheduling: Default::default(),
            network_policy: None,
            annotations: Default::default(),
        }
    }

    fn test_sla() -> Sla {
        Sla {
            id: None,
            slice_id: "1-000001".to_string(),
            up_bandwidth: 50.0,
            down_bandwidth: 50.0,
            latency: 50.0,
            availability: 99.9,
        }
    }

    fn play_json_reply(ingress: &str) -> ChatMessage {
        let mut play = test_play();
        play.id = None;
        play.slice_id = "9-ffffff".to_string();
        play.bandwidth.ingress = ingress.to_string();
        ChatMessage {
            role: "assistant".to_string(),
            content: Some(serde_json::to_string(&play).unwrap()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn strategy(model: Arc<FakeChatModel>) -> AiStrategy {
        AiStrategy::new(model, Arc::new(FakeMetrics), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_direct_json_reply_becomes_play() {
        let model = FakeChatModel::new(vec![play_json_reply("150M")]);
        let current = test_play();
        let expected_id = current.id;

        let play = strategy(model)
            .reconcile(current, test_sla())
            .await
            .unwrap();
        assert_eq!(play.bandwidth.ingress, "150M");
        // id and slice_id are pinned to the input even if the model drifts.
        assert_eq!(play.id, expected_id);
        assert_eq!(play.slice_id, "1-000001");
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let tool_call = ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: "call-1".to_string(),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: METRICS_TOOL_NAME.to_string(),
                    arguments: r#"{"slice_id":"1-000001","duration":10800,"step":60}"#
                        .to_string(),
                },
            }]),
            tool_call_id: None,
        };
        let model = FakeChatModel::new(vec![tool_call, play_json_reply("175M")]);

        let play = strategy(model.clone())
            .reconcile(test_play(), test_sla())
            .await
            .unwrap();
        assert_eq!(play.bandwidth.ingress, "175M");

        // Second round must carry the assistant tool call plus the tool
        // result on top of the six seeded messages.
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[6, 8]);
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        let mut reply = play_json_reply("125M");
        reply.content = Some(format!("```json\n{}\n```", reply.content.unwrap()));
        let model = FakeChatModel::new(vec![reply]);

        let play = strategy(model)
            .reconcile(test_play(), test_sla())
            .await
            .unwrap();
        assert_eq!(play.bandwidth.ingress, "125M");
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_an_error() {
        let reply = ChatMessage {
            role: "assistant".to_string(),
            content: Some("here is your play: better bandwidth".to_string()),
            tool_calls: None,
            tool_call_id: None,
        };
        let model = FakeChatModel::new(vec![reply]);

        let err = strategy(model)
            .reconcile(test_play(), test_sla())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[tokio::test]
    async fn test_agent_step_cap() {
        let tool_call = ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: "call-loop".to_string(),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: METRICS_TOOL_NAME.to_string(),
                    arguments: r#"{"slice_id":"1-000001","duration":60,"step":60}"#.to_string(),
                },
            }]),
            tool_call_id: None,
        };
        let model = FakeChatModel::new(vec![tool_call; 12]);

        let err = strategy(model)
            .reconcile(test_play(), test_sla())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeded"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_metrics_tool_schema_names_match_wire_contract() {
        let tool = MetricsTool::new(Arc::new(FakeMetrics));
        let spec = tool.describe();
        assert_eq!(spec.function.name, "Metrics Fetcher");
        let required = spec.function.parameters["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
    }
}
