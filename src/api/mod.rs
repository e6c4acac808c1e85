//! Typed domain operations over the request pipeline, grouped by backend
//! area. Each submodule adds methods to [`crate::client::ApiClient`].

mod auth;
mod tasks;
