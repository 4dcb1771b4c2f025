// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reducer-based state container.

use std::sync::Arc;
use tokio::sync::watch;

/// Pure state transition.
pub type Reducer<S, A> = Arc<dyn Fn(&S, &A) -> S + Send + Sync>;

/// Wraps a reducer to observe or rewrite every transition.
pub type MetaReducer<S, A> = Arc<dyn Fn(Reducer<S, A>) -> Reducer<S, A> + Send + Sync>;

/// Side effect run after an action has been reduced.
pub trait Effect<S, A>: Send + Sync {
    fn on_action(&self, action: &A, state: &S);
}

/// Wrap `reducer` in `meta_reducers`, the first entry outermost.
pub fn compose<S, A>(reducer: Reducer<S, A>, meta_reducers: &[MetaReducer<S, A>]) -> Reducer<S, A> {
    meta_reducers
        .iter()
        .rev()
        .fold(reducer, |inner, meta| meta(inner))
}

pub struct Store<S, A> {
    state: watch::Sender<S>,
    reducer: Reducer<S, A>,
    effects: Vec<Arc<dyn Effect<S, A>>>,
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(initial: S, reducer: Reducer<S, A>, meta_reducers: &[MetaReducer<S, A>]) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            reducer: compose(reducer, meta_reducers),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Arc<dyn Effect<S, A>>) -> Self {
        self.effects.push(effect);
        self
    }

    /// Reduce `action` into the state, then run every effect.
    pub fn dispatch(&self, action: A) {
        let reducer = &self.reducer;
        self.state.send_modify(|state| *state = reducer(state, &action));

        let state = self.snapshot();
        for effect in &self.effects {
            effect.on_action(&action, &state);
        }
    }

    /// Watch the state; the receiver sees every dispatched transition.
    pub fn select(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> S {
        self.state.borrow().clone()
    }
}
