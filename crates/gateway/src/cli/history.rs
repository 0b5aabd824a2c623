//! `pangea-chat history` — print the transcript rebuilt from the audit log.

use std::sync::Arc;

use pc_domain::config::Config;

use super::{login, render};
use crate::bootstrap;

pub async fn history(config: Arc<Config>, json_output: bool) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;
    let session = login::open_session(&state).await?;
    let snapshot = session.snapshot();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot.transcript)?);
    } else {
        render::print_transcript(&snapshot.transcript);
        eprintln!("{}", render::quota_line(&snapshot.rate_limit));
    }
    if let Some(notice) = &snapshot.notice {
        render::print_notice(notice);
    }
    Ok(())
}
