//! skillpulse - 职位市场需求分析 Agent
//!
//! 模块划分：
//! - **agent**: 运行时装配（存储、分析引擎、工具、执行器）与任务处理
//! - **analytics**: 时间窗口、查询计划、存储协作者（SQLite / 内存）、需求分析引擎、技能分类
//! - **charts**: 图表产物（声明式 JSON 图表描述，原子写入）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、循环状态、工具并发调度
//! - **llm**: LLM 客户端抽象与 Mock 实现
//! - **observability**: tracing 初始化
//! - **protocol**: 最终响应协议与任务信封
//! - **react**: 决策协作者、Planner、编排主循环
//! - **tools**: 工具注册表、参数校验、执行器与市场分析工具

pub mod agent;
pub mod analytics;
pub mod charts;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod protocol;
pub mod react;
pub mod tools;
