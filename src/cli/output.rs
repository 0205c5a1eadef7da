// Plain-text tables for the `check` and `run` summaries

use crate::config::PipelineConfig;
use crate::models::{Channel, DatasetState, Stage};
use crate::pipeline::{error_chain, DatasetOutcome};

fn channel_list(channels: &[Channel]) -> String {
    if channels.is_empty() {
        return "-".to_string();
    }
    channels.iter().map(|c| c.name()).collect::<Vec<_>>().join(",")
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Work list with the channels each dataset will start with, followed by
/// the stage switches
pub fn format_work_list(config: &PipelineConfig) -> String {
    let work_list = config.work_list();
    let rows: Vec<(String, String, String)> = work_list
        .iter()
        .map(|dataset| {
            let channels: Vec<Channel> = Channel::ALL
                .iter()
                .copied()
                .filter(|c| config.channels.enabled(*c) && dataset.requests(*c))
                .collect();
            (
                dataset.id.clone(),
                channel_list(&channels),
                dataset.source_root.display().to_string(),
            )
        })
        .collect();

    let mut id_width = 7; // "Dataset"
    let mut channels_width = 8;
    for (id, channels, _) in &rows {
        id_width = id_width.max(id.len());
        channels_width = channels_width.max(channels.len());
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<id$} {:<ch$} {}\n",
        "Dataset",
        "Channels",
        "Source",
        id = id_width,
        ch = channels_width
    ));
    output.push_str(&format!("{}\n", "-".repeat(id_width + channels_width + 8)));
    for (id, channels, source) in &rows {
        output.push_str(&format!(
            "{:<id$} {:<ch$} {}\n",
            id,
            channels,
            source,
            id = id_width,
            ch = channels_width
        ));
    }

    output.push('\n');
    output.push_str(&format!("{:<24} {:<4} {}\n", "Stage", "Run", "Debug"));
    for stage in Stage::ALL {
        let toggle = config.stages.get(stage);
        output.push_str(&format!(
            "{:<24} {:<4} {}\n",
            stage.title(),
            on_off(toggle.run),
            on_off(toggle.debug)
        ));
    }
    output
}

/// Batch summary, one row per dataset plus error details for failures
pub fn format_outcomes(outcomes: &[DatasetOutcome]) -> String {
    if outcomes.is_empty() {
        return "No datasets processed.\n".to_string();
    }

    let mut id_width = 7;
    let mut reached_width = 7;
    for outcome in outcomes {
        id_width = id_width.max(outcome.id.len());
        reached_width = reached_width.max(outcome.reached.label().len());
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<id$} {:<6} {:<reached$} {}\n",
        "Dataset",
        "State",
        "Reached",
        "Active",
        id = id_width,
        reached = reached_width
    ));
    output.push_str(&format!("{}\n", "-".repeat(id_width + reached_width + 20)));

    for outcome in outcomes {
        output.push_str(&format!(
            "{:<id$} {:<6} {:<reached$} {}\n",
            outcome.id,
            outcome.state.label(),
            outcome.reached.label(),
            channel_list(&outcome.active),
            id = id_width,
            reached = reached_width
        ));
    }

    let failures: Vec<&DatasetOutcome> = outcomes
        .iter()
        .filter(|o| o.state == DatasetState::Failed)
        .collect();
    if !failures.is_empty() {
        output.push('\n');
        for outcome in &failures {
            if let Some(err) = &outcome.error {
                output.push_str(&format!("{}: {}\n", outcome.id, error_chain(err)));
            }
        }
    }

    output.push_str(&format!(
        "\n{} done, {} failed\n",
        outcomes.len() - failures.len(),
        failures.len()
    ));
    output
}
