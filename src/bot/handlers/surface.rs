//! Progress and report embeds, and the channel message that shows them.

use crate::core::{
    artifact::ArtifactRef,
    engine::{ExecutionReport, ProgressSnapshot, ProgressSurface, SurfaceError},
    report::{self, ReportColor},
};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Embed colour for a report colour family.
#[must_use]
pub const fn colour(color: ReportColor) -> serenity::Colour {
    match color {
        ReportColor::Green => serenity::Colour::DARK_GREEN,
        ReportColor::Orange => serenity::Colour::ORANGE,
        ReportColor::Red => serenity::Colour::RED,
        ReportColor::Grey => serenity::Colour::LIGHT_GREY,
    }
}

/// Embed shown while a run is in progress.
#[must_use]
pub fn progress_embed(snapshot: &ProgressSnapshot) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("Executing Commands...")
        .description(report::render_progress(snapshot))
        .colour(colour(ReportColor::Orange))
}

/// Embed shown when a run ends.
#[must_use]
pub fn report_embed(report: &ExecutionReport) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(report::report_title(report))
        .description(report::render_report(report))
        .colour(colour(report::report_color(report)))
        .footer(serenity::CreateEmbedFooter::new(format!("Tier: {}", report.tier)))
}

/// Embed shown before an undo runs.
#[must_use]
pub fn undo_proposal_embed(artifact: &ArtifactRef, candidate: &str) -> serenity::CreateEmbed {
    let body = format!(
        "File: `{}`\n\nThis will overwrite the file and run:\n```\n{}\n```",
        artifact.display_name(),
        report::truncate(candidate, 3800)
    );
    serenity::CreateEmbed::new()
        .title("Proposed Undo")
        .description(body)
        .colour(colour(ReportColor::Grey))
}

/// A channel message created on the first update and edited afterwards.
///
/// A 404 from Discord means the message or channel was deleted, which stalls
/// the run.
pub struct MessageSurface {
    http: Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
    message_id: Mutex<Option<serenity::MessageId>>,
}

impl MessageSurface {
    /// Creates a surface that will post into `channel_id`.
    #[must_use]
    pub fn new(http: Arc<serenity::Http>, channel_id: serenity::ChannelId) -> Self {
        Self {
            http,
            channel_id,
            message_id: Mutex::new(None),
        }
    }

    /// Deletes the progress message, if one was posted.
    pub async fn clear(&self) {
        if let Some(id) = self.message_id.lock().await.take() {
            if let Err(e) = self.channel_id.delete_message(self.http.as_ref(), id).await {
                tracing::debug!("Could not remove progress message: {e}");
            }
        }
    }
}

fn surface_error(e: serenity::Error) -> SurfaceError {
    match &e {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404 =>
        {
            SurfaceError::Gone
        }
        _ => SurfaceError::Other(e.to_string()),
    }
}

#[async_trait]
impl ProgressSurface for MessageSurface {
    async fn update(&self, snapshot: &ProgressSnapshot) -> Result<(), SurfaceError> {
        let embed = progress_embed(snapshot);
        let mut message_id = self.message_id.lock().await;
        let existing = *message_id;

        match existing {
            Some(id) => {
                self.channel_id
                    .edit_message(self.http.as_ref(), id, serenity::EditMessage::new().embed(embed))
                    .await
                    .map_err(surface_error)?;
            }
            None => {
                let message = self
                    .channel_id
                    .send_message(self.http.as_ref(), serenity::CreateMessage::new().embed(embed))
                    .await
                    .map_err(surface_error)?;
                *message_id = Some(message.id);
            }
        }
        Ok(())
    }
}
