// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Meta-reducers: debug logging and rehydration from local storage.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use super::local_storage::{load_initial_state, LocalStorage};
use super::store::{MetaReducer, Reducer};

/// Actions that can signal store initialization.
pub trait InitAction {
    fn is_init(&self) -> bool;
}

/// Log every action with the state before and after it.
pub fn debug<S, A>() -> MetaReducer<S, A>
where
    S: Debug + 'static,
    A: Debug + 'static,
{
    Arc::new(|reducer: Reducer<S, A>| -> Reducer<S, A> {
        Arc::new(move |state: &S, action: &A| {
            let next = reducer(state, action);
            tracing::debug!(
                action = ?action,
                previous = ?state,
                next = ?next,
                "Reduced action"
            );
            next
        })
    })
}

/// On init, overlay the persisted state onto the reduced state.
///
/// Persisted slices replace whole top-level slices. A persisted state that
/// no longer fits the state type is logged and ignored.
pub fn init_state_from_local_storage<S, A>(storage: Arc<dyn LocalStorage>) -> MetaReducer<S, A>
where
    S: Serialize + DeserializeOwned + 'static,
    A: InitAction + 'static,
{
    Arc::new(move |reducer: Reducer<S, A>| -> Reducer<S, A> {
        let storage = Arc::clone(&storage);
        Arc::new(move |state: &S, action: &A| {
            let next = reducer(state, action);
            if !action.is_init() {
                return next;
            }
            match rehydrate(&next, load_initial_state(storage.as_ref())) {
                Ok(Some(merged)) => merged,
                Ok(None) => next,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring persisted state");
                    next
                }
            }
        })
    })
}

fn rehydrate<S>(state: &S, persisted: Value) -> Result<Option<S>, serde_json::Error>
where
    S: Serialize + DeserializeOwned,
{
    let Value::Object(persisted) = persisted else {
        return Ok(None);
    };
    if persisted.is_empty() {
        return Ok(None);
    }

    let mut current = serde_json::to_value(state)?;
    if let Value::Object(current) = &mut current {
        current.extend(persisted);
    }
    serde_json::from_value(current).map(Some)
}
