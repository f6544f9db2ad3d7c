//! # model3d-forge
//!
//! 文本/图像生成 3D 模型的服务运行时：内容指纹缓存、相似度复用、供应商请求签名与任务生命周期编排。
//!
//! Generation runtime for text-to-3D and image-to-3D requests. Every request is
//! fingerprinted and served from a similarity-aware result cache when possible; only
//! a true miss reaches the billed external provider, and concurrent identical
//! requests share a single provider job.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use model3d_forge::cache::ResultCache;
//! use model3d_forge::config::GeneratorConfig;
//! use model3d_forge::lifecycle::TaskLifecycle;
//! use model3d_forge::provider::{HunyuanProvider, ProviderGateway};
//! use model3d_forge::store::{InMemoryTaskStore, TaskStore};
//! use model3d_forge::types::GenerationRequest;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> model3d_forge::Result<()> {
//!     let config = GeneratorConfig::load("model3d.yaml")?;
//!     config.validate()?;
//!
//!     let provider = HunyuanProvider::new(config.credentials()?, config.hunyuan_settings())?;
//!     let gateway = ProviderGateway::new(Arc::new(provider), config.gateway_settings());
//!     let store = Arc::new(InMemoryTaskStore::new());
//!     store.open().await?;
//!
//!     let lifecycle = TaskLifecycle::new(
//!         Arc::new(ResultCache::in_memory(config.cache_settings())),
//!         Arc::new(gateway),
//!         store,
//!     );
//!     let task = lifecycle.submit(GenerationRequest::text("user-1", "A cube")).await?;
//!     println!("{} {:?}", task.status, task.result.asset_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Tasks, requests, status machine, result references |
//! | [`cache`] | Keys, similarity matching, result cache and backends |
//! | [`provider`] | Request signing, validation, submit/poll gateway |
//! | [`lifecycle`] | Task orchestration and request coalescing |
//! | [`store`] | Task persistence boundary |
//! | [`quality`] | Post-completion quality scoring |
//! | [`config`] | YAML + environment configuration |
//! | [`transport`] | HTTP transport |
//! | [`telemetry`] | Tracing initialization |

pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod provider;
pub mod quality;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use cache::{CacheKeyer, ResultCache};
pub use config::GeneratorConfig;
pub use lifecycle::TaskLifecycle;
pub use provider::{ProviderGateway, ProviderSigner};
pub use types::{GenerationKind, GenerationRequest, GenerationTask, ResultRef, TaskStatus};

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

pub mod error;
pub use error::{Error, ErrorContext};
