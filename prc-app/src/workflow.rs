use crate::config::{AppConfig, Catalog};
use anyhow::{bail, Context, Result};
use prc_core::{
    capture::Submission,
    controller::{ControllerBuilder, ExecutionController, View},
    error::PrcError,
    store::JsonFileStore,
    timeline::{TimelinePayload, TimelineStep},
};
use prc_schemas::{
    environment::AmbientConditions,
    tree::{Key, StatusFlag},
};
use std::sync::Arc;

pub async fn init_execution(
    config: &AppConfig,
    catalog: &Catalog,
    template_id: &str,
    execution_id: &str,
) -> Result<()> {
    let template = catalog.get(template_id)?.clone();
    let store = JsonFileStore::new(&config.store_dir);
    let record = store
        .create_execution(execution_id, template)
        .await
        .with_context(|| format!("Failed to create execution '{}'", execution_id))?;
    println!(
        "Created execution '{}' from template '{}' ({} steps) at {:?}",
        record.execution_id,
        record.template.template_id,
        record.counters.total_steps,
        store.path_for(execution_id)
    );
    Ok(())
}

pub async fn open(config: &AppConfig, execution_id: &str) -> Result<ExecutionController> {
    let mut builder =
        ControllerBuilder::new().with_store(Arc::new(JsonFileStore::new(&config.store_dir)));
    if let Some(path) = &config.audit_log {
        builder = builder.with_audit_log_to_file(path);
    }
    builder
        .open(execution_id)
        .await
        .with_context(|| format!("Failed to open execution '{}'", execution_id))
}

fn describe(step: &TimelineStep<'_>) -> String {
    match &step.payload {
        TimelinePayload::Sequence(entry) => {
            let filled = entry.sub_steps.iter().filter(|s| s.filled).count();
            format!(
                "{}/{} sub-steps, {:.0}s of {:.0}s{}",
                filled,
                entry.sub_steps.len(),
                entry.timing.actual_duration_seconds,
                entry.timing.expected_duration_seconds,
                if entry.timing.timing_exceeded { " (exceeded)" } else { "" }
            )
        }
        TimelinePayload::CatalystMixing { escalated: true, .. } => {
            "needs production sign-off".to_string()
        }
        _ if step.data_filled() => "data captured".to_string(),
        _ => String::new(),
    }
}

pub fn print_timeline(controller: &ExecutionController) {
    let counters = controller.counters();
    println!(
        "--- {} / {} ({}) at {} ---",
        controller.execution_id(),
        controller.template().template_id,
        controller.template().name,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    for step in controller.timeline() {
        let marker = if step.is_critical { "*" } else { " " };
        println!(
            "{:>3}{} [{:<11}] {:<28} {}",
            step.step_number,
            marker,
            step.status,
            step.title,
            describe(&step)
        );
    }
    println!(
        "Completed {}/{} steps, {}/{} critical",
        counters.steps_completed,
        counters.total_steps,
        counters.completed_critical,
        counters.total_critical
    );
}

/// Fills in the configured operator where a sub-step submission names nobody.
fn with_operator(submission: Submission, operator: Option<&str>) -> Submission {
    match (submission, operator) {
        (
            Submission::SubStep {
                sub_step_id,
                value,
                responsible_person: None,
            },
            Some(operator),
        ) => Submission::SubStep {
            sub_step_id,
            value,
            responsible_person: Some(operator.to_string()),
        },
        (submission, _) => submission,
    }
}

/// Persists again once when the store refused the first write.
async fn settle(controller: &mut ExecutionController, result: Result<(), PrcError>) -> Result<()> {
    match result {
        Err(PrcError::Persistence { source, .. }) => {
            tracing::warn!(error = %source, "save failed, retrying once");
            controller
                .retry_save()
                .await
                .context("Progress was captured but could not be saved")
        }
        Err(e) if e.is_input_error() => {
            Err(anyhow::Error::new(e).context("Input rejected, nothing was saved"))
        }
        other => other.map_err(Into::into),
    }
}

pub async fn submit(
    config: &AppConfig,
    execution_id: &str,
    step_number: usize,
    submission: Submission,
    acknowledged: &[u32],
) -> Result<()> {
    let mut controller = open(config, execution_id).await?;
    if let View::Preview { .. } = controller.select(step_number)? {
        controller.back()?;
    }
    if let Submission::SubStep { sub_step_id, .. } = &submission {
        controller.focus_sub_step(*sub_step_id)?;
    }
    for entry in acknowledged {
        controller.acknowledge(Key::Id(*entry))?;
    }

    let submission = with_operator(submission, config.operator.as_deref());
    let result = controller.submit(submission).await.map(|_| ());
    settle(&mut controller, result).await?;

    match controller.view() {
        View::Preview { step_number } => {
            println!("Step {} has all its data and is ready for review.", step_number)
        }
        View::Detail {
            sub_step: Some(next),
            ..
        } => println!("Saved. Next sub-step: {}", next),
        _ => println!("Saved."),
    }
    print_timeline(&controller);
    Ok(())
}

pub async fn approve(
    config: &AppConfig,
    execution_id: &str,
    step_number: usize,
    flag: StatusFlag,
) -> Result<()> {
    let mut controller = open(config, execution_id).await?;
    if let View::Detail { .. } = controller.select(step_number)? {
        bail!("Step {} still has data to capture", step_number);
    }
    let result = controller.approve(flag).await;
    settle(&mut controller, result).await?;
    println!("Recorded {} on step {}.", flag, step_number);
    print_timeline(&controller);
    Ok(())
}

pub async fn evaluate_catalyst(
    config: &AppConfig,
    execution_id: &str,
    line_id: u32,
    conditions: AmbientConditions,
    entered: Option<f64>,
) -> Result<()> {
    let controller = open(config, execution_id).await?;
    let evaluation = controller.evaluate_catalyst(line_id, conditions)?;
    match evaluation.range {
        Some(range) => println!(
            "Line {}: catalyst between {:.3} and {:.3}{}{}",
            line_id,
            range.min,
            range.max,
            if evaluation.requires_approval { ", needs production sign-off" } else { "" },
            if evaluation.blocks { ", BLOCKED at these conditions" } else { "" }
        ),
        None => println!("Line {}: no band matches, quantity is unconstrained", line_id),
    }
    if evaluation.ratio_fallback {
        println!("Note: no ratio for this material, the gelcoat ratio was used.");
    }
    if let Some(classification) = entered.and_then(|q| evaluation.classify(q)) {
        println!("Entered quantity is {:?}.", classification);
    }
    Ok(())
}
