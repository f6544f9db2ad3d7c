//! 类型系统模块：定义生成任务、任务状态机与结果引用等核心数据类型。
//!
//! # Types Module
//!
//! This module defines the core domain types shared by the cache, the provider
//! gateway and the task lifecycle.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GenerationKind`] | Input modality (`TEXT` or `IMAGE`) |
//! | [`TaskStatus`] | Lifecycle state with its transition table |
//! | [`ResultRef`] | Where a generated asset lives (asset URL, local path, preview) |
//! | [`GenerationTask`] | Append-only audit record of one generation request |
//! | [`GenerationRequest`] | What a requester asks for |
//! | [`QualityParams`] | Generation parameters that partition the cache |
//!
//! ## Example
//!
//! ```rust
//! use model3d_forge::types::{GenerationKind, GenerationRequest, TaskStatus};
//!
//! let request = GenerationRequest::text("user-1", "A cube");
//! assert_eq!(request.kind, GenerationKind::Text);
//! assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cached));
//! assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
//! ```

pub mod request;
pub mod status;
pub mod task;

pub use request::{GenerationRequest, QualityParams, DEFAULT_RESULT_FORMAT};
pub use status::{GenerationKind, TaskStatus};
pub use task::{GenerationTask, ResultRef};
