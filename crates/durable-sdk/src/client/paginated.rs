//! Page-token-driven result streams: `list_workflow_executions` and
//! `list_schedules` both return a page plus an opaque continuation token;
//! this wraps that shape as a single `Stream` that fetches the next page
//! lazily and terminates when the server stops returning a token.

use std::pin::Pin;

use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};

use super::error::ClientError;

type Fetch<T> = Box<dyn FnMut(Option<Vec<u8>>) -> BoxFuture<'static, Result<(Vec<T>, Option<Vec<u8>>), ClientError>> + Send>;

/// A lazily-fetched, auto-paginating stream of `T`.
pub struct PaginatedStream<T> {
    inner: Pin<Box<dyn Stream<Item = Result<T, ClientError>> + Send>>,
}

impl<T: Send + 'static> PaginatedStream<T> {
    /// `fetch(token)` returns the next page and the token to pass on the
    /// following call; a `None` token both starts and ends the stream (no
    /// more pages after the one just returned).
    pub fn new(fetch: Fetch<T>) -> Self {
        // `Some(None)` means "there is a fetch left to perform, with this
        // token"; `None` is the terminal state once a page comes back with
        // no continuation token.
        let state = (fetch, Some(None::<Vec<u8>>));
        let inner = stream::unfold(state, |(mut fetch, token_opt)| async move {
            let token = token_opt?;
            match fetch(token).await {
                Ok((items, next_token)) => {
                    let next_state = (fetch, next_token.map(Some));
                    Some((stream::iter(items.into_iter().map(Ok)), next_state))
                }
                Err(err) => Some((stream::iter(vec![Err(err)]), (fetch, None))),
            }
        })
        .flatten();

        Self { inner: Box::pin(inner) }
    }
}

impl<T> Stream for PaginatedStream<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fetches_pages_until_the_token_runs_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let stream = PaginatedStream::new(Box::new(move |token: Option<Vec<u8>>| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                match token {
                    None => Ok((vec![1, 2], Some(vec![1u8]))),
                    Some(t) if t == vec![1u8] => Ok((vec![3, 4], Some(vec![2u8]))),
                    Some(t) if t == vec![2u8] => Ok((vec![5], None)),
                    _ => unreachable!(),
                }
            })
        }));

        let items: Vec<i32> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_single_empty_page_terminates_immediately() {
        let stream: PaginatedStream<i32> =
            PaginatedStream::new(Box::new(|_token| Box::pin(async move { Ok((vec![], None)) })));
        let items: Vec<i32> = stream.map(|r| r.unwrap()).collect().await;
        assert!(items.is_empty());
    }
}
