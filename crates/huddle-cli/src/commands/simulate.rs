use anyhow::{Context, Result, bail};
use colored::Colorize;
use huddle_application::{ChannelSync, LoadOutcome, ProgressOverlay, SyncContext};
use huddle_core::channel::ChannelViewState;
use huddle_core::config::HuddleConfig;
use huddle_infrastructure::{LocalBackend, StaticSessionProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);
const USER_ID: &str = "simulator";

#[derive(Serialize)]
struct ViewSummary {
    active_channel_id: Option<String>,
    message_count: usize,
    has_more: bool,
    next_offset: usize,
    is_loading_messages: bool,
    newest: Option<String>,
}

impl From<&ChannelViewState> for ViewSummary {
    fn from(state: &ChannelViewState) -> Self {
        Self {
            active_channel_id: state.active_channel_id.clone(),
            message_count: state.messages.len(),
            has_more: state.messages.has_more,
            next_offset: state.messages.next_offset,
            is_loading_messages: state.is_loading_messages,
            newest: state.messages.messages.last().map(|m| m.body.clone()),
        }
    }
}

#[derive(Serialize)]
struct Step<'a> {
    step: &'a str,
    view: ViewSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<u8>,
}

struct Reporter {
    json: bool,
}

impl Reporter {
    fn report(&self, step: &str, state: &ChannelViewState, progress: Option<u8>) -> Result<()> {
        let step = Step {
            step,
            view: ViewSummary::from(state),
            progress,
        };
        if self.json {
            println!("{}", serde_json::to_string(&step)?);
            return Ok(());
        }

        let channel = step
            .view
            .active_channel_id
            .as_deref()
            .map(|c| format!("#{c}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {:<28} {} messages={} has_more={} next_offset={}",
            "✓".green(),
            step.step.bold(),
            channel.cyan(),
            step.view.message_count,
            step.view.has_more,
            step.view.next_offset
        );
        if let Some(progress) = step.progress {
            println!("    progress {}%", progress.to_string().yellow());
        }
        Ok(())
    }
}

/// Runs the scripted scenario: switch, page, live edits, rescope, progress.
pub async fn run(config: &HuddleConfig, history: usize, json: bool) -> Result<()> {
    let reporter = Reporter { json };
    if !json {
        println!("🚀 Simulating sync against the in-memory backend...");
    }

    let backend = LocalBackend::new(config.sync.event_buffer);
    backend.create_channel("general", "p1", &[USER_ID]).await;
    backend.create_channel("random", "p1", &[USER_ID]).await;
    backend.seed_history("general", "teammate", history).await?;
    backend.seed_history("random", "teammate", 3).await?;

    let ctx = SyncContext::new(
        backend.repository.clone(),
        Arc::new(StaticSessionProvider::signed_in(USER_ID)),
        backend.transport.clone(),
        config.sync.clone(),
    );
    let sync = ChannelSync::new(ctx.clone());
    let overlay = ProgressOverlay::new(ctx);

    sync.set_active_channel(Some("general")).await?;
    reporter.report("open #general", &sync.state(), None)?;

    loop {
        match sync.load_older().await? {
            LoadOutcome::Appended { .. } => {
                reporter.report("load older", &sync.state(), None)?;
            }
            LoadOutcome::Exhausted => break,
            other => bail!("Unexpected pagination outcome: {:?}", other),
        }
    }

    let posted = backend
        .post_message("general", "teammate", "hello from the stream")
        .await?;
    wait_for_view(&sync, |s| s.messages.contains(&posted.id)).await?;
    reporter.report("live insert", &sync.state(), None)?;

    backend
        .edit_message("general", &posted.id, "hello, edited")
        .await?;
    wait_for_view(&sync, |s| {
        s.messages
            .messages
            .iter()
            .any(|m| m.id == posted.id && m.body == "hello, edited")
    })
    .await?;
    reporter.report("live update", &sync.state(), None)?;

    backend.remove_message("general", &posted.id).await?;
    wait_for_view(&sync, |s| !s.messages.contains(&posted.id)).await?;
    reporter.report("live delete", &sync.state(), None)?;

    sync.set_active_channel(Some("random")).await?;
    reporter.report("switch to #random", &sync.state(), None)?;

    let mut completions = overlay
        .take_completions()
        .await
        .context("Completion stream already taken")?;
    overlay.set_project_id(Some("p1")).await?;
    for (step, progress) in [("indexing", 40), ("finished", 100)] {
        backend.report_progress("p1", step, progress).await?;
    }
    let completion = timeout(STEP_TIMEOUT, completions.recv())
        .await
        .context("Timed out waiting for job completion")?
        .context("Completion stream closed")?;
    reporter.report(
        "job completed",
        &sync.state(),
        Some(completion.event.progress),
    )?;

    overlay.set_project_id(None).await?;
    sync.shutdown().await;
    reporter.report("shutdown", &sync.state(), None)?;

    let leaked = backend.transport.active_subscriptions().await;
    if leaked > 0 {
        bail!("{} subscriptions still open after shutdown", leaked);
    }
    if !json {
        println!("✅ Simulation finished with no open subscriptions");
    }
    Ok(())
}

async fn wait_for_view(
    sync: &ChannelSync,
    predicate: impl FnMut(&ChannelViewState) -> bool,
) -> Result<()> {
    let mut updates = sync.watch();
    timeout(STEP_TIMEOUT, updates.wait_for(predicate))
        .await
        .context("Timed out waiting for the view to update")?
        .context("View store went away")?;
    Ok(())
}
