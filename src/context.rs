//! Execution-scoped trace/span context
//!
//! Each tokio task (or synchronous call stack entered via the `*_sync`
//! helpers) sees its own frame. Entering a scope installs a new frame for
//! the duration of the body and the previous one is restored when the body
//! finishes, returns an error or unwinds. Spawned tasks start with an empty
//! frame; nothing is shared across concurrent scopes.
//!
//! ```ignore
//! let trace = client.trace(Trace::new("chat")).await?;
//! context::with_trace(trace.id.clone().unwrap(), async {
//!     let frame = context::current();
//!     let mut span = Span { name: Some("retrieve".into()), ..Default::default() };
//!     frame.link(&mut span.trace_id, &mut span.parent_observation_id);
//!     client.span(span).await
//! })
//! .await?;
//! ```

use std::future::Future;

tokio::task_local! {
    static FRAME: ContextFrame;
}

/// Identifiers visible to the running scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFrame {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

impl ContextFrame {
    pub fn is_empty(&self) -> bool {
        self.trace_id.is_none() && self.span_id.is_none()
    }

    /// Fill unset linkage fields of a record from this frame
    ///
    /// Fields that already hold a value are left alone.
    pub fn link(&self, trace_id: &mut Option<String>, parent_observation_id: &mut Option<String>) {
        if trace_id.is_none() {
            trace_id.clone_from(&self.trace_id);
        }
        if parent_observation_id.is_none() {
            parent_observation_id.clone_from(&self.span_id);
        }
    }

    fn for_trace(trace_id: String) -> Self {
        Self {
            trace_id: Some(trace_id),
            span_id: None,
        }
    }

    fn with_span(mut self, span_id: String) -> Self {
        self.span_id = Some(span_id);
        self
    }
}

/// Frame visible to the caller, empty if none was installed
pub fn current() -> ContextFrame {
    FRAME.try_with(ContextFrame::clone).unwrap_or_default()
}

/// Run `body` with a fresh frame holding only `trace_id`
pub async fn with_trace<F>(trace_id: impl Into<String>, body: F) -> F::Output
where
    F: Future,
{
    FRAME
        .scope(ContextFrame::for_trace(trace_id.into()), body)
        .await
}

/// Run `body` with `span_id` merged into a copy of the current frame
///
/// The enclosing trace id, if any, stays visible.
pub async fn with_span<F>(span_id: impl Into<String>, body: F) -> F::Output
where
    F: Future,
{
    let frame = current().with_span(span_id.into());
    FRAME.scope(frame, body).await
}

/// Synchronous counterpart of [`with_trace`]
pub fn with_trace_sync<R>(trace_id: impl Into<String>, body: impl FnOnce() -> R) -> R {
    FRAME.sync_scope(ContextFrame::for_trace(trace_id.into()), body)
}

/// Synchronous counterpart of [`with_span`]
pub fn with_span_sync<R>(span_id: impl Into<String>, body: impl FnOnce() -> R) -> R {
    let frame = current().with_span(span_id.into());
    FRAME.sync_scope(frame, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    #[test]
    fn test_current_is_empty_outside_any_scope() {
        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn test_nested_spans_keep_outer_trace() {
        with_trace("t-1", async {
            assert_eq!(current().trace_id.as_deref(), Some("t-1"));
            assert_eq!(current().span_id, None);

            with_span("s-1", async {
                with_span("s-2", async {
                    let frame = current();
                    assert_eq!(frame.trace_id.as_deref(), Some("t-1"));
                    assert_eq!(frame.span_id.as_deref(), Some("s-2"));
                })
                .await;

                assert_eq!(current().span_id.as_deref(), Some("s-1"));
            })
            .await;

            assert_eq!(current().span_id, None);
        })
        .await;

        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn test_frame_restored_when_body_returns_error() {
        let result: Result<(), &str> = with_trace("t-1", async {
            with_span("s-1", async {
                with_span("s-2", async { Err::<(), _>("boom") }).await?;
                Ok(())
            })
            .await
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert!(current().is_empty());
    }

    #[test]
    fn test_frame_restored_when_body_panics() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            with_trace_sync("t-1", || {
                with_span_sync("s-1", || {
                    with_span_sync("s-2", || {
                        assert_eq!(current().span_id.as_deref(), Some("s-2"));
                        panic!("innermost block failed");
                    })
                })
            })
        }));

        assert!(result.is_err());
        assert!(current().is_empty());
    }

    #[test]
    fn test_with_trace_replaces_enclosing_span() {
        with_trace_sync("t-1", || {
            with_span_sync("s-1", || {
                with_trace_sync("t-2", || {
                    let frame = current();
                    assert_eq!(frame.trace_id.as_deref(), Some("t-2"));
                    assert_eq!(frame.span_id, None);
                });
                assert_eq!(current().trace_id.as_deref(), Some("t-1"));
            });
        });
    }

    #[tokio::test]
    async fn test_concurrent_tasks_do_not_share_frames() {
        let first = tokio::spawn(with_trace("t-a", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            current().trace_id
        }));
        let second = tokio::spawn(with_trace("t-b", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            current().trace_id
        }));

        assert_eq!(first.await.unwrap().as_deref(), Some("t-a"));
        assert_eq!(second.await.unwrap().as_deref(), Some("t-b"));
    }

    #[tokio::test]
    async fn test_spawned_task_starts_empty() {
        with_trace("t-1", async {
            let inner = tokio::spawn(async { current() }).await.unwrap();
            assert!(inner.is_empty());
        })
        .await;
    }

    #[test]
    fn test_link_fills_only_missing_fields() {
        let frame = ContextFrame {
            trace_id: Some("t-1".to_string()),
            span_id: Some("s-1".to_string()),
        };

        let mut trace_id = None;
        let mut parent = Some("explicit".to_string());
        frame.link(&mut trace_id, &mut parent);

        assert_eq!(trace_id.as_deref(), Some("t-1"));
        assert_eq!(parent.as_deref(), Some("explicit"));
    }
}
