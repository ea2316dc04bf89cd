// Copyright (c) 2025 Tokenpool Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::sync::oneshot;

use tokenpool_types::errors::GenericError;
use tokenpool_types::pool_state::PoolState;

use crate::error::{MutationPanic, RequestError};

pub(crate) type Mutation =
    Box<dyn FnOnce(&PoolState) -> Result<PoolState, GenericError> + Send + 'static>;

type CompletionSender = oneshot::Sender<Result<bool, RequestError>>;

pub(crate) struct QueuedRequest {
    mutation: Mutation,
    completion: CompletionSender,
}

impl QueuedRequest {
    pub(crate) fn new(mutation: Mutation) -> (Self, RequestCompletion) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                mutation,
                completion: tx,
            },
            RequestCompletion::new(rx),
        )
    }

    /// Applies the mutation to `state`. Errors and panics of the mutation are caught and
    /// resolve the request right away. Otherwise the new state and the pending completion are
    /// returned.
    pub(crate) fn apply(self, state: &PoolState) -> Option<(PoolState, PendingCompletion)> {
        let Self {
            mutation,
            completion,
        } = self;

        let result = match panic::catch_unwind(AssertUnwindSafe(|| mutation(state))) {
            Ok(result) => result,
            Err(payload) => Err(MutationPanic::from_payload(payload).into()),
        };

        match result {
            Ok(state) => Some((state, PendingCompletion(completion))),
            Err(err) => {
                let _ = completion.send(Err(RequestError::Mutation(err)));
                None
            }
        }
    }

    pub(crate) fn reject(self, err: RequestError) {
        let _ = self.completion.send(Err(err));
    }
}

/// Completion of a request whose mutation was applied to the batch state.
pub(crate) struct PendingCompletion(CompletionSender);

impl PendingCompletion {
    pub(crate) fn resolve(self, committed: bool) {
        // the caller might have dropped the completion future
        let _ = self.0.send(Ok(committed));
    }
}

/// Insertion ordered queue of the requests waiting for the drain worker.
#[derive(Default)]
pub(crate) struct RequestQueue {
    requests: VecDeque<QueuedRequest>,
    closed: bool,
}

impl RequestQueue {
    /// Appends the request unless the queue is closed, in which case it is handed back.
    pub(crate) fn push(&mut self, request: QueuedRequest) -> Result<(), QueuedRequest> {
        if self.closed {
            return Err(request);
        }

        self.requests.push_back(request);
        Ok(())
    }

    /// Takes up to `limit` requests in enqueue order.
    pub(crate) fn take_batch(&mut self, limit: usize) -> Vec<QueuedRequest> {
        if limit >= self.requests.len() {
            self.requests.drain(..).collect()
        } else {
            self.requests.drain(..limit).collect()
        }
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }
}

/// Future which resolves once the request has been committed or rolled back.
///
/// Resolves to `Ok(true)` if the request's mutation was committed, `Ok(false)` if its batch was
/// rolled back, and `Err` if the mutation failed or the store was shut down.
#[must_use = "futures do nothing unless polled"]
pub struct RequestCompletion {
    rx: oneshot::Receiver<Result<bool, RequestError>>,
}

impl RequestCompletion {
    fn new(rx: oneshot::Receiver<Result<bool, RequestError>>) -> Self {
        Self { rx }
    }
}

impl Future for RequestCompletion {
    type Output = Result<bool, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(Pin::new(&mut self.rx).poll(cx));

        // a dropped sender means the drain worker is gone
        Poll::Ready(result.unwrap_or(Err(RequestError::Shutdown)))
    }
}
