// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side routing state.
//!
//! The shell does not render views; it tracks which route the client should
//! show and lets the client poll or watch it.

use std::sync::Mutex;
use tokio::sync::watch;

pub const HOME_ROUTE: &str = "/";
pub const LOGIN_ROUTE: &str = "/login";

/// Something that can move the client to another route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Current route plus the history of navigations.
pub struct RouteState {
    current: watch::Sender<String>,
    history: Mutex<Vec<String>>,
}

impl Default for RouteState {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteState {
    pub fn new() -> Self {
        let (current, _) = watch::channel(HOME_ROUTE.to_string());
        Self {
            current,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> String {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<String> {
        self.current.subscribe()
    }

    /// Every route navigated to, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// How many times `route` was navigated to.
    pub fn visits(&self, route: &str) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|r| r.as_str() == route)
            .count()
    }
}

impl Navigator for RouteState {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "Navigating");
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(route.to_string());
        self.current.send_replace(route.to_string());
    }
}
