//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 调用前按参数 schema 校验，校验失败直接返回错误结果，不触达工具本身。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentError, ErrorCode};
use crate::tools::schema::validate_arguments;

/// 工具输出中表示“需要调用方补充信息”的 status
pub const INPUT_REQUIRED: &str = "input_required";

/// 工具 trait：名称、描述（供决策协作者理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（决策中的 "name" 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 是否为分析类工具（其成功结果可作为 completed 响应的依据）
    fn is_analytics(&self) -> bool {
        false
    }

    /// 执行工具；输出至少包含 success 与 message
    async fn execute(&self, args: Value) -> Result<Value, AgentError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// 一次工具调用的结果（进入 transcript，不可丢弃）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// 分析类工具且 success = true
    pub grounding: bool,
    pub output: Value,
}

impl ToolResult {
    /// 从工具输出构造；success=false 且错误码为 NO_DATA_FOUND，或 status 为 input_required 时不算工具错误
    pub fn from_output(output: Value, analytics: bool) -> Self {
        let success = output.get("success").and_then(Value::as_bool).unwrap_or(false);
        let needs_input = output.get("status").and_then(Value::as_str) == Some(INPUT_REQUIRED);
        let message = output
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut error_code = output
            .get("error_code")
            .and_then(Value::as_str)
            .and_then(ErrorCode::parse);
        if needs_input {
            error_code = None;
        } else if !success && error_code.is_none() {
            error_code = Some(ErrorCode::ToolExecutionError);
        }
        let status = if success || needs_input || error_code == Some(ErrorCode::NoDataFound) {
            ToolStatus::Ok
        } else {
            ToolStatus::Error
        };
        Self {
            status,
            success,
            message,
            error_code: if success { None } else { error_code },
            grounding: analytics && success,
            output,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ToolStatus::Error,
            success: false,
            output: json!({
                "success": false,
                "message": message,
                "error_code": code,
            }),
            message,
            error_code: Some(code),
            grounding: false,
        }
    }

    pub fn from_error(err: &AgentError) -> Self {
        Self::error(err.error_code(), err.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    pub fn is_grounding_evidence(&self) -> bool {
        self.grounding
    }

    /// 工具缺少调用方才能提供的信息（输出带 required_fields）
    pub fn needs_input(&self) -> bool {
        self.output.get("status").and_then(Value::as_str) == Some(INPUT_REQUIRED)
    }

    /// 供 transcript 渲染的一行摘要
    pub fn summary(&self) -> String {
        match self.error_code {
            Some(code) => format!("[{}] {}", code, self.message),
            None => self.message.clone(),
        }
    }
}

/// 工具目录条目（交给决策协作者）
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub analytics: bool,
}

/// 工具注册表：保持注册顺序，按名称索引
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；重名或 schema 顶层不是 object 时拒绝
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(AgentError::Registry("tool name must not be blank".to_string()));
        }
        if self.index.contains_key(&name) {
            return Err(AgentError::Registry(format!("duplicate tool name: {name}")));
        }
        check_schema(&name, &tool.parameters_schema())?;
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
                analytics: tool.is_analytics(),
            })
            .collect()
    }

    /// 工具目录 JSON（拼入 prompt）
    pub fn to_schema_json(&self) -> String {
        serde_json::to_string_pretty(&self.catalog()).unwrap_or_else(|_| "[]".to_string())
    }

    /// 循环开始前的完整性检查；失败属于不可恢复错误
    pub fn check_integrity(&self) -> Result<(), AgentError> {
        if self.tools.is_empty() {
            return Err(AgentError::Registry("no tools registered".to_string()));
        }
        for tool in &self.tools {
            check_schema(tool.name(), &tool.parameters_schema())?;
        }
        Ok(())
    }

    /// 查找工具并校验参数
    pub fn resolve(&self, name: &str, args: &Value) -> Result<Arc<dyn Tool>, AgentError> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        validate_arguments(&tool.parameters_schema(), args)
            .map_err(|e| AgentError::InvalidArgument(format!("{name}: {e}")))?;
        Ok(tool)
    }

    /// 校验并调用；任何失败都以 ToolResult 形式返回
    pub async fn invoke(&self, name: &str, args: Value) -> ToolResult {
        let tool = match self.resolve(name, &args) {
            Ok(tool) => tool,
            Err(e) => return ToolResult::from_error(&e),
        };
        match tool.execute(args).await {
            Ok(output) => ToolResult::from_output(output, tool.is_analytics()),
            Err(e) => ToolResult::from_error(&e),
        }
    }
}

fn check_schema(name: &str, schema: &Value) -> Result<(), AgentError> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(AgentError::Registry(format!(
            "tool {name}: parameter schema must be an object schema"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo text"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string", "minLength": 1}},
                "required": ["text"],
                "additionalProperties": false
            })
        }
        async fn execute(&self, args: Value) -> Result<Value, AgentError> {
            Ok(json!({"success": true, "message": args["text"]}))
        }
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        assert!(matches!(registry.register(Echo), Err(AgentError::Registry(_))));
        assert_eq!(registry.tool_names(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_handler() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo).unwrap();
        let result = registry.invoke("echo", json!({"text": 3})).await;
        assert!(result.is_error());
        assert_eq!(result.error_code, Some(ErrorCode::InvalidInputFormat));

        let result = registry.invoke("echo", json!({"text": "hi"})).await;
        assert!(result.success);
        assert_eq!(result.message, "hi");
        assert!(!result.is_grounding_evidence());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_result() {
        let registry = ToolRegistry::new();
        let result = registry.invoke("nope", json!({})).await;
        assert!(result.is_error());
        assert!(result.message.contains("Unknown tool"));
        assert!(registry.check_integrity().is_err());
    }

    #[test]
    fn test_no_data_output_is_not_a_tool_error() {
        let result = ToolResult::from_output(
            json!({"success": false, "message": "none", "error_code": "NO_DATA_FOUND"}),
            true,
        );
        assert!(!result.is_error());
        assert!(!result.is_grounding_evidence());

        let result = ToolResult::from_output(json!({"success": false, "message": "boom"}), true);
        assert!(result.is_error());
        assert_eq!(result.error_code, Some(ErrorCode::ToolExecutionError));
    }
}
