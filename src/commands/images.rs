//! One-shot image commands: list, load, delete and raw action dispatch

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::k8s::actions::{ActionRequest, DELETE_ACTION, IMAGE_ID_KEY, LOAD_ACTION, Orchestrator};
use crate::utils::progress::with_spinner_result;
use crate::view::build_overview;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Handle the list command
pub fn list(orchestrator: &Orchestrator, output: OutputFormat) -> Result<()> {
    let overview = build_overview(orchestrator);

    match output {
        OutputFormat::Text => print!("{}", overview.render_text()),
        OutputFormat::Json => println!(
            "{}",
            overview.render_json().context("Failed to serialize overview")?
        ),
    }

    Ok(())
}

/// Handle the load command
pub fn load(orchestrator: &Orchestrator, settings: &Settings, image: &str) -> Result<()> {
    let request = ActionRequest::for_image(LOAD_ACTION, image);

    with_spinner_result(
        settings.behavior.show_progress,
        &format!("Loading {} into kind cluster '{}'...", image, orchestrator.cluster().name),
        &format!("Loaded {}", image),
        || orchestrator.handle_action(&request),
    )?;

    Ok(())
}

/// Handle the delete command
pub fn delete(
    orchestrator: &Orchestrator,
    settings: &Settings,
    image_id: &str,
    yes: bool,
) -> Result<()> {
    if settings.behavior.confirm_destructive
        && !yes
        && !crate::utils::confirm(&format!(
            "Do you want to delete {} from your kind images?",
            image_id
        ))?
    {
        crate::log_info!("Deletion cancelled");
        return Ok(());
    }

    let request = ActionRequest::for_image(DELETE_ACTION, image_id);

    with_spinner_result(
        settings.behavior.show_progress,
        &format!("Deleting {}...", image_id),
        &format!("Deleted {}", image_id),
        || orchestrator.handle_action(&request),
    )?;

    Ok(())
}

/// Handle the action command: dispatch a raw request as a host would
pub fn action(orchestrator: &Orchestrator, name: &str, payload: Option<&str>) -> Result<()> {
    let payload = parse_payload(payload)?;
    let request = ActionRequest::new(name, payload);

    crate::log_info!("Dispatching action {}", request.action_name);
    orchestrator.handle_action(&request)?;

    println!("✓ {} ({})", request.action_name, request.string(IMAGE_ID_KEY).unwrap_or("-"));
    Ok(())
}

/// Parse a `--payload` argument into a JSON object; absent means empty
pub fn parse_payload(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };

    match serde_json::from_str::<Value>(raw).context("Payload is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("Payload must be a JSON object, got: {}", other)),
    }
}
