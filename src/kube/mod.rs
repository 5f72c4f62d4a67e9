//! Kubernetes API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - bearer token resolution and caching
//! - [`client`] - [`client::KubeClient`], the HTTP [`ResourceClient`](crate::resource::fetcher::ResourceClient)
//! - [`http`] - low-level GET with status mapping
//!
//! # Example
//!
//! ```ignore
//! use vmsnap::kube::{auth::KubeCredentials, client::KubeClient, http::TlsOptions};
//!
//! let creds = KubeCredentials::resolve(None, None);
//! let client = KubeClient::new("https://10.0.0.1:6443", creds, timeout, &TlsOptions::default())?;
//! ```

pub mod auth;
pub mod client;
pub mod http;
