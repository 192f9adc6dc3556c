use std::sync::Arc;

/// Milestones of one `update`/`resolve` call, reported to an optional
/// observer supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    Aggregating { name: String, spec: String },
    Fetched { name: String, version: String },
    Aggregated { packages: usize, versions: usize },
    Resolving { name: String },
    Resolved { packages: usize },
}

pub type ProgressObserver = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

pub(crate) fn notify(observer: Option<&ProgressObserver>, event: ProgressEvent) {
    if let Some(observer) = observer {
        observer(&event);
    }
}
