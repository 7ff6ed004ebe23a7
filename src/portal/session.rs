use async_trait::async_trait;
use std::path::Path;
use tracing::{error, info, warn};

use super::types::*;

/// One browser session against the vendor portal. Steps are called in
/// order by [`run_upload`].
#[async_trait]
pub trait PortalSession: Send {
    async fn launch(&mut self) -> Result<(), PortalError>;
    async fn login(&mut self) -> Result<(), PortalError>;
    async fn navigate_to_upload_page(&mut self) -> Result<(), PortalError>;
    async fn upload_file(&mut self, file: &Path) -> Result<UploadAck, PortalError>;
    /// Select every result row and request the CSV export
    async fn extract_results(&mut self) -> Result<(), PortalError>;
    /// Must be safe to call whether or not `launch` succeeded
    async fn close(&mut self);
}

/// Anything that can take an upload sheet and report what happened
#[async_trait]
pub trait PortalClient: Send + Sync {
    async fn submit(&self, file: &Path) -> UploadOutcome;
}

/// Drive a session from launch to result export. The session is closed on
/// every path.
pub async fn run_upload<S>(session: &mut S, file: &Path) -> UploadOutcome
where
    S: PortalSession + ?Sized,
{
    let outcome = match drive(session, file).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(file = %file.display(), "upload failed: {}", e);
            UploadOutcome::Failed(e.to_string())
        }
    };

    session.close().await;
    outcome
}

async fn drive<S>(session: &mut S, file: &Path) -> Result<UploadOutcome, PortalError>
where
    S: PortalSession + ?Sized,
{
    session.launch().await?;
    session.login().await?;
    session.navigate_to_upload_page().await?;

    match session.upload_file(file).await? {
        UploadAck::InputError => {
            warn!(file = %file.display(), "portal rejected the upload sheet");
            Ok(UploadOutcome::InputRejected)
        }
        UploadAck::Accepted => {
            session.extract_results().await?;
            info!(file = %file.display(), "upload submitted, export requested");
            Ok(UploadOutcome::Submitted)
        }
    }
}
