//! 最终响应协议
//!
//! AgentResponse 在循环终止时一次性构造，状态只有 input_required / completed / failed。
//! completed 必须有至少一条成功的分析类工具结果作依据，否则降级为 failed(NO_SUPPORTING_DATA)；
//! 叙述字段（market_context）只由各结果的 summary 生成，不包含行级数据。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentError, ErrorCode, TranscriptEntry};
use crate::tools::ToolResult;

/// 决策协作者未给出置信度时的默认值
const DEFAULT_CONFIDENCE: f64 = 0.8;
/// 预算耗尽时由 transcript 直接组装的 completed 响应的置信度
const EXHAUSTED_CONFIDENCE: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequiredField {
    pub field_name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputRequiredPayload {
    pub required_fields: Vec<RequiredField>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub reasoning: String,
    pub confidence_score: f64,
    pub criteria_used: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub market_context: String,
}

/// completed 响应的主体：个人建议或市场情报，二选一
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intelligence {
    AdvisoryPayload(Value),
    MarketIntelligence(Value),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<String>,
    #[serde(flatten)]
    pub intelligence: Intelligence,
    pub analysis: Analysis,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedPayload {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub suggestion: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentResponse {
    InputRequired(InputRequiredPayload),
    Completed(CompletedPayload),
    Failed(FailedPayload),
}

impl AgentResponse {
    pub fn status(&self) -> &'static str {
        match self {
            AgentResponse::InputRequired(_) => "input_required",
            AgentResponse::Completed(_) => "completed",
            AgentResponse::Failed(_) => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AgentResponse::Completed(_))
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            AgentResponse::Failed(p) => Some(p.error_code),
            _ => None,
        }
    }

    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        AgentResponse::Failed(FailedPayload {
            error_code: code,
            error_message: message.into(),
            suggestion: code.default_suggestion().to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeclaredStatus {
    Completed,
    Failed,
    InputRequired,
}

impl DeclaredStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "input_required" => Some(Self::InputRequired),
            _ => None,
        }
    }
}

/// payload 中的字段：先看顶层，再看 analysis 子对象
fn field<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload
        .get(key)
        .or_else(|| payload.get("analysis").and_then(|a| a.get(key)))
}

fn text_field(payload: &Value, key: &str) -> Option<String> {
    field(payload, key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn list_field(payload: &Value, key: &str) -> Vec<String> {
    field(payload, key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn tool_results(transcript: &[TranscriptEntry]) -> impl Iterator<Item = (&str, &ToolResult)> {
    transcript
        .iter()
        .filter_map(TranscriptEntry::as_tool)
        .map(|(call, result)| (call.name.as_str(), result))
}

fn grounding(transcript: &[TranscriptEntry]) -> Vec<(&str, &ToolResult)> {
    tool_results(transcript)
        .filter(|(_, r)| r.is_grounding_evidence())
        .collect()
}

/// 各依据结果的 summary.message（缺失时用结果 message）
fn market_context(evidence: &[(&str, &ToolResult)]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for (_, result) in evidence {
        let line = result
            .output
            .get("summary")
            .and_then(|s| s.get("message"))
            .and_then(Value::as_str)
            .unwrap_or(&result.message)
            .to_string();
        if !line.is_empty() && !lines.contains(&line) {
            lines.push(line);
        }
    }
    lines.join(" ")
}

/// 从依据结果的 summary 组装市场情报（不含行级数据）
fn derived_intelligence(evidence: &[(&str, &ToolResult)]) -> Value {
    let findings: Vec<Value> = evidence
        .iter()
        .map(|(tool, result)| {
            let summary = result.output.get("summary").cloned().unwrap_or(Value::Null);
            json!({
                "tool": tool,
                "top": summary.get("top_name").cloned().unwrap_or(Value::Null),
                "total_matched": summary.get("total_matched").cloned().unwrap_or(Value::Null),
                "total_universe": summary.get("total_universe").cloned().unwrap_or(Value::Null),
                "window": summary.get("window").cloned().unwrap_or(Value::Null),
                "plot_path": result.output.get("plot_path").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    json!({ "findings": findings })
}

fn criteria_from(evidence: &[(&str, &ToolResult)]) -> Vec<String> {
    let mut tools: Vec<String> = Vec::new();
    for (tool, _) in evidence {
        if !tools.iter().any(|t| t == tool) {
            tools.push(tool.to_string());
        }
    }
    tools
}

/// 最近一次要求补充信息的工具结果（且其后没有成功的分析结果）
fn pending_input(transcript: &[TranscriptEntry]) -> Option<&ToolResult> {
    tool_results(transcript)
        .map(|(_, r)| r)
        .filter(|r| r.needs_input() || r.is_grounding_evidence())
        .last()
        .filter(|r| r.needs_input())
}

/// 依据中最近一次职位推荐的输出
fn latest_recommendations<'a>(evidence: &[(&str, &'a ToolResult)]) -> Option<&'a Value> {
    evidence
        .iter()
        .rev()
        .map(|(_, r)| &r.output)
        .find(|output| output.get("recommendations").is_some())
}

/// 由推荐结果组装个人建议
fn derived_advisory(recommendation: &Value) -> Value {
    json!({
        "recommendations": recommendation.get("recommendations").cloned().unwrap_or(Value::Null),
        "summary": recommendation
            .get("summary")
            .and_then(|s| s.get("message"))
            .cloned()
            .unwrap_or(Value::Null),
    })
}

fn required_fields_from(value: &Value) -> Vec<RequiredField> {
    value
        .get("required_fields")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("field_name").and_then(Value::as_str)?;
                    Some(RequiredField {
                        field_name: name.to_string(),
                        description: item
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 最近一次失败结果（错误码、消息）
fn last_failure(transcript: &[TranscriptEntry]) -> Option<(ErrorCode, String)> {
    tool_results(transcript)
        .filter_map(|(_, r)| r.error_code.map(|code| (code, r.message.clone())))
        .last()
}

#[derive(Debug, Default, Clone)]
pub struct ResponseProtocol;

impl ResponseProtocol {
    pub fn new() -> Self {
        Self
    }

    /// 决策协作者声明结束时调用
    pub fn finalize(
        &self,
        transcript: &[TranscriptEntry],
        declared_status: Option<&str>,
        payload: &Value,
    ) -> AgentResponse {
        let status = match declared_status.and_then(DeclaredStatus::parse) {
            Some(status) => status,
            None => {
                return AgentResponse::failed(
                    ErrorCode::ProtocolViolation,
                    format!(
                        "Unrecognized final status: {}",
                        declared_status.unwrap_or("(missing)")
                    ),
                );
            }
        };

        match status {
            DeclaredStatus::Completed => self.completed(transcript, payload, None),
            DeclaredStatus::Failed => self.failed(transcript, payload),
            DeclaredStatus::InputRequired => Self::input_required(transcript, payload),
        }
    }

    /// 预算耗尽：只根据 transcript 组装
    pub fn finalize_exhausted(&self, transcript: &[TranscriptEntry]) -> AgentResponse {
        let evidence = grounding(transcript);
        if !evidence.is_empty() {
            let payload = json!({
                "reasoning": format!(
                    "The tool budget ran out; this answer is assembled from {} completed analysis result(s).",
                    evidence.len()
                ),
                "weaknesses": ["The analysis stopped at the tool-call limit and may be incomplete."],
            });
            return self.completed(transcript, &payload, Some(EXHAUSTED_CONFIDENCE));
        }
        if pending_input(transcript).is_some() {
            return Self::input_required(transcript, &Value::Null);
        }
        match last_failure(transcript) {
            Some((code, message)) => AgentResponse::failed(code, message),
            None => AgentResponse::failed(
                ErrorCode::NoSupportingData,
                "The tool budget ran out before any analysis succeeded.",
            ),
        }
    }

    /// 不可恢复的内部错误
    pub fn finalize_fatal(&self, err: &AgentError) -> AgentResponse {
        AgentResponse::failed(err.error_code(), err.to_string())
    }

    fn completed(
        &self,
        transcript: &[TranscriptEntry],
        payload: &Value,
        confidence_override: Option<f64>,
    ) -> AgentResponse {
        let evidence = grounding(transcript);
        if evidence.is_empty() {
            return AgentResponse::failed(
                ErrorCode::NoSupportingData,
                "A completed answer was declared without any successful analysis result.",
            );
        }

        let recommendation = latest_recommendations(&evidence);
        let declared = |key: &str| payload.get(key).filter(|v| !v.is_null()).cloned();
        let intelligence = match (declared("advisory_payload"), declared("market_intelligence")) {
            (Some(advice), _) => Intelligence::AdvisoryPayload(advice),
            (None, Some(market)) => Intelligence::MarketIntelligence(market),
            (None, None) => match recommendation {
                Some(rec) => Intelligence::AdvisoryPayload(derived_advisory(rec)),
                None => Intelligence::MarketIntelligence(derived_intelligence(&evidence)),
            },
        };
        let profile_summary = text_field(payload, "profile_summary").or_else(|| {
            recommendation.and_then(|rec| text_field(rec, "profile_summary"))
        });

        let confidence = confidence_override
            .or_else(|| field(payload, "confidence_score").and_then(Value::as_f64))
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);
        let mut criteria_used = list_field(payload, "criteria_used");
        if criteria_used.is_empty() {
            criteria_used = criteria_from(&evidence);
        }
        let market_context = market_context(&evidence);

        AgentResponse::Completed(CompletedPayload {
            profile_summary,
            intelligence,
            analysis: Analysis {
                reasoning: text_field(payload, "reasoning").unwrap_or_else(|| market_context.clone()),
                confidence_score: confidence,
                criteria_used,
                strengths: list_field(payload, "strengths"),
                weaknesses: list_field(payload, "weaknesses"),
                market_context,
            },
        })
    }

    fn failed(&self, transcript: &[TranscriptEntry], payload: &Value) -> AgentResponse {
        let last = last_failure(transcript);
        let code = text_field(payload, "error_code")
            .and_then(|c| ErrorCode::parse(&c))
            .or_else(|| last.as_ref().map(|(code, _)| *code))
            .unwrap_or(ErrorCode::ToolExecutionError);
        let error_message = text_field(payload, "error_message")
            .or_else(|| last.map(|(_, message)| message))
            .unwrap_or_else(|| "The request could not be completed.".to_string());
        let suggestion = text_field(payload, "suggestion")
            .unwrap_or_else(|| code.default_suggestion().to_string());
        AgentResponse::Failed(FailedPayload {
            error_code: code,
            error_message,
            suggestion,
        })
    }

    /// required_fields 依次取自 payload、最近一次要求补充信息的工具结果，都没有时默认问 skills
    fn input_required(transcript: &[TranscriptEntry], payload: &Value) -> AgentResponse {
        let pending = pending_input(transcript);
        let mut required_fields = required_fields_from(payload);
        if required_fields.is_empty() {
            if let Some(result) = pending {
                required_fields = required_fields_from(&result.output);
            }
        }
        if required_fields.is_empty() {
            required_fields.push(RequiredField {
                field_name: "skills".to_string(),
                description: "The skills or job roles to analyze, e.g. Python, Data Scientist".to_string(),
            });
        }
        AgentResponse::InputRequired(InputRequiredPayload {
            required_fields,
            message: text_field(payload, "message")
                .or_else(|| pending.map(|r| r.message.clone()).filter(|m| !m.is_empty()))
                .unwrap_or_else(|| "More information is needed to analyze the job market.".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCall;

    fn entry(name: &str, result: ToolResult) -> TranscriptEntry {
        TranscriptEntry::Tool {
            call: ToolCall {
                name: name.into(),
                arguments: json!({}),
                sequence_number: 1,
            },
            result,
        }
    }

    fn grounded() -> Vec<TranscriptEntry> {
        vec![entry(
            "analyze_skill_demand",
            ToolResult::from_output(
                json!({
                    "success": true,
                    "message": "Python leads skill demand with 40 postings (20.00% of 200) for all time.",
                    "data": [{"name": "Python", "frequency": 40}],
                    "summary": {
                        "message": "Python leads skill demand with 40 postings (20.00% of 200) for all time.",
                        "top_name": "Python",
                        "total_matched": 40,
                        "total_universe": 200
                    }
                }),
                true,
            ),
        )]
    }

    #[test]
    fn test_unknown_status_is_protocol_violation() {
        let p = ResponseProtocol::new();
        let response = p.finalize(&grounded(), Some("done"), &Value::Null);
        assert_eq!(response.error_code(), Some(ErrorCode::ProtocolViolation));
        let response = p.finalize(&grounded(), None, &Value::Null);
        assert_eq!(response.error_code(), Some(ErrorCode::ProtocolViolation));
    }

    #[test]
    fn test_completed_without_evidence_is_downgraded() {
        let p = ResponseProtocol::new();
        let transcript = vec![entry(
            "categorize_skills",
            ToolResult::from_output(json!({"success": true, "message": "grouped"}), false),
        )];
        let response = p.finalize(&transcript, Some("completed"), &json!({"reasoning": "trust me"}));
        assert_eq!(response.error_code(), Some(ErrorCode::NoSupportingData));
    }

    #[test]
    fn test_completed_shape_and_context_from_summary() {
        let p = ResponseProtocol::new();
        let response = p.finalize(
            &grounded(),
            Some("Completed"),
            &json!({"analysis": {"reasoning": "Python dominates.", "confidence_score": 1.7}}),
        );
        let AgentResponse::Completed(payload) = &response else {
            panic!("expected completed");
        };
        assert_eq!(payload.analysis.confidence_score, 1.0);
        assert_eq!(payload.analysis.criteria_used, vec!["analyze_skill_demand"]);
        assert!(payload.analysis.market_context.starts_with("Python leads"));

        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["status"], "completed");
        assert_eq!(wire["market_intelligence"]["findings"][0]["top"], "Python");
        assert!(wire.get("error_code").is_none());
    }

    #[test]
    fn test_failed_always_has_suggestion() {
        let p = ResponseProtocol::new();
        let response = p.finalize(&[], Some("failed"), &json!({"suggestion": "  "}));
        let AgentResponse::Failed(payload) = response else {
            panic!("expected failed");
        };
        assert_eq!(payload.error_code, ErrorCode::ToolExecutionError);
        assert!(!payload.suggestion.is_empty());
    }

    #[test]
    fn test_exhausted_uses_latest_failure_code() {
        let p = ResponseProtocol::new();
        let transcript = vec![
            entry("top_skills", ToolResult::error(ErrorCode::InvalidInputFormat, "bad")),
            entry("top_skills", ToolResult::error(ErrorCode::DatabaseQueryFailed, "timed out")),
        ];
        assert_eq!(
            p.finalize_exhausted(&transcript).error_code(),
            Some(ErrorCode::DatabaseQueryFailed)
        );
        assert_eq!(p.finalize_exhausted(&[]).error_code(), Some(ErrorCode::NoSupportingData));

        let AgentResponse::Completed(payload) = p.finalize_exhausted(&grounded()) else {
            panic!("expected completed");
        };
        assert_eq!(payload.analysis.confidence_score, 0.5);
    }

    #[test]
    fn test_input_required_defaults() {
        let response = ResponseProtocol::new().finalize(&[], Some("input_required"), &Value::Null);
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["status"], "input_required");
        assert_eq!(wire["required_fields"][0]["field_name"], "skills");
    }

    fn missing_profile() -> ToolResult {
        ToolResult::from_output(
            json!({
                "success": false,
                "status": "input_required",
                "message": "Missing required fields: industry, position",
                "required_fields": [
                    {"field_name": "industry", "description": "Target industry"},
                    {"field_name": "position", "description": "Target position"}
                ]
            }),
            true,
        )
    }

    fn recommended() -> ToolResult {
        ToolResult::from_output(
            json!({
                "success": true,
                "message": "2 posting(s) match the profile.",
                "profile_summary": "Industry: Fintech. Position: Backend Engineer. Skills: Python.",
                "recommendations": [{"job_id": 7, "job_title": "Backend Engineer"}],
                "summary": {"message": "2 posting(s) match the profile.", "top_name": "Backend Engineer"}
            }),
            true,
        )
    }

    #[test]
    fn test_input_required_uses_tool_fields() {
        let p = ResponseProtocol::new();
        let transcript = vec![entry("recommend_jobs", missing_profile())];
        let wire = serde_json::to_value(p.finalize(&transcript, Some("input_required"), &json!({}))).unwrap();
        assert_eq!(wire["required_fields"][0]["field_name"], "industry");
        assert_eq!(wire["required_fields"][1]["field_name"], "position");
        assert_eq!(wire["message"], "Missing required fields: industry, position");

        // 预算耗尽且只有补充信息请求时也是 input_required
        assert_eq!(p.finalize_exhausted(&transcript).status(), "input_required");
    }

    #[test]
    fn test_recommendations_become_advisory_payload() {
        let p = ResponseProtocol::new();
        let transcript = vec![
            entry("recommend_jobs", missing_profile()),
            entry("recommend_jobs", recommended()),
        ];
        let AgentResponse::Completed(payload) = p.finalize(&transcript, Some("completed"), &json!({})) else {
            panic!("expected completed");
        };
        assert_eq!(
            payload.profile_summary.as_deref(),
            Some("Industry: Fintech. Position: Backend Engineer. Skills: Python.")
        );
        let Intelligence::AdvisoryPayload(advice) = &payload.intelligence else {
            panic!("expected advisory payload");
        };
        assert_eq!(advice["recommendations"][0]["job_id"], 7);
        // 之后有成功结果，预算耗尽时不再要求补充信息
        assert!(p.finalize_exhausted(&transcript).is_completed());
    }
}
