//! Closed outcome vocabularies for coordinator operations
//!
//! Every operation maps the full HTTP status space into a small, fixed set
//! of outcomes so callers never re-interpret raw HTTP semantics. The
//! classifiers are total: unexpected codes always land in the designated
//! default arm.

use forge_core::domain::job::JobDescriptor;
use forge_core::dto::runner::RegisterRunnerResponse;

/// Outcome of a job acquisition call
#[derive(Debug, PartialEq)]
pub enum AcquireOutcome {
    /// The coordinator handed out a job
    Acquired(Box<JobDescriptor>),

    /// Nothing to do right now; keep polling
    NoJobAvailable,

    /// Credentials rejected; stop polling this cycle
    Forbidden,

    /// Coordinator unreachable
    TransportError(String),

    /// Unanticipated status; treated as transient, keep polling
    UnknownFailure { status: u16 },
}

/// Outcome of a runner registration call
#[derive(Debug, PartialEq)]
pub enum RegistrationOutcome {
    Registered(RegisterRunnerResponse),

    /// Bad registration token
    Forbidden,

    TransportError(String),

    Failed { status: u16 },
}

/// Outcome of a runner unregistration call
#[derive(Debug, PartialEq)]
pub enum UnregisterOutcome {
    Unregistered,
    Forbidden,
    TransportError(String),
    Failed { status: u16 },
}

/// Outcome of a registration-validity probe
///
/// The probe targets a fabricated job id, so 404 is the healthy answer.
/// An indeterminate response must not deregister a live runner, hence the
/// classifier fails open.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Alive,
    Removed,
    TransportError(String),
}

/// Outcome of a job state update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    /// Update accepted; keep reporting
    Succeeded,

    /// Job vanished, was cancelled, or the coordinator is unreachable;
    /// stop reporting and cancel local execution
    Abort,

    /// Transient failure; retry later with the same state
    Failed,
}

/// Outcome of an artifact upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Succeeded,
    Forbidden,
    /// Payload exceeded the coordinator-side limit; do not retry as-is
    TooLarge,
    Failed,
}

/// Outcome of an artifact download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Succeeded,
    Forbidden,
    NotFound,
    Failed,
}

/// Total status classifier for job state updates
///
/// A transport error is handled by the caller before classification and
/// maps to `Abort`: a job that cannot be reported on should stop consuming
/// resources, while a reachable-but-confusing coordinator stays retryable.
pub(crate) fn classify_update(status: u16) -> UpdateState {
    match status {
        200 => UpdateState::Succeeded,
        403 | 404 => UpdateState::Abort,
        _ => UpdateState::Failed,
    }
}

/// Status-only verification result; the caller folds transport errors in
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum VerifyState {
    Alive,
    Removed,
}

/// Total status classifier for the verification probe
///
/// 404 is the expected healthy answer (the probe targets a fabricated job
/// id); anything other than an explicit 403 also counts as alive.
pub(crate) fn classify_verify(status: u16) -> VerifyState {
    match status {
        403 => VerifyState::Removed,
        _ => VerifyState::Alive,
    }
}

/// Total status classifier for artifact uploads
pub(crate) fn classify_upload(status: u16) -> UploadState {
    match status {
        201 => UploadState::Succeeded,
        403 => UploadState::Forbidden,
        413 => UploadState::TooLarge,
        _ => UploadState::Failed,
    }
}

/// Total status classifier for artifact downloads
///
/// 200 means the body is streamable; the caller only reports `Succeeded`
/// once the body has been fully persisted.
pub(crate) fn classify_download(status: u16) -> DownloadState {
    match status {
        200 => DownloadState::Succeeded,
        403 => DownloadState::Forbidden,
        404 => DownloadState::NotFound,
        _ => DownloadState::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_classification_matches_contract() {
        assert_eq!(classify_update(200), UpdateState::Succeeded);
        assert_eq!(classify_update(404), UpdateState::Abort);
        assert_eq!(classify_update(403), UpdateState::Abort);
        // Unanticipated codes stay retryable
        assert_eq!(classify_update(500), UpdateState::Failed);
        assert_eq!(classify_update(418), UpdateState::Failed);
        assert_eq!(classify_update(201), UpdateState::Failed);
    }

    #[test]
    fn test_verify_classification_fails_open() {
        assert_eq!(classify_verify(404), VerifyState::Alive);
        assert_eq!(classify_verify(403), VerifyState::Removed);
        // An indeterminate response must not deregister a live runner
        assert_eq!(classify_verify(200), VerifyState::Alive);
        assert_eq!(classify_verify(500), VerifyState::Alive);
    }

    #[test]
    fn test_upload_classification_matches_contract() {
        assert_eq!(classify_upload(201), UploadState::Succeeded);
        assert_eq!(classify_upload(403), UploadState::Forbidden);
        assert_eq!(classify_upload(413), UploadState::TooLarge);
        assert_eq!(classify_upload(200), UploadState::Failed);
        assert_eq!(classify_upload(500), UploadState::Failed);
    }

    #[test]
    fn test_download_classification_matches_contract() {
        assert_eq!(classify_download(200), DownloadState::Succeeded);
        assert_eq!(classify_download(403), DownloadState::Forbidden);
        assert_eq!(classify_download(404), DownloadState::NotFound);
        assert_eq!(classify_download(502), DownloadState::Failed);
    }

    #[test]
    fn test_no_status_is_left_unclassified() {
        // Spot-sweep the whole status range; the classifiers are total
        for status in 100..600 {
            let _ = classify_update(status);
            let _ = classify_verify(status);
            let _ = classify_upload(status);
            let _ = classify_download(status);
        }
    }
}
