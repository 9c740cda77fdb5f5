//! 与制品库 REST 接口交互的部分。
//!
//! 子模块：
//! - `client`    — 带 Basic 认证的 GET/流式下载客户端（抓取与下载共用）
//! - `models`    — 接口 JSON 结构
//! - `provision` — 仓库定义查询/删除/重建
//! - `metrics`   — 后台指标轮询
//! - `aql`       — AQL 查询压测

pub mod aql;
pub mod client;
pub mod metrics;
pub mod models;
pub mod provision;

pub use client::{FetchError, HttpStoreClient, StoreClient};
