//! Interactive menu: browse images, load in the background, delete

use anyhow::Result;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Settings;
use crate::k8s::actions::{ActionRequest, LOAD_ACTION, Orchestrator};
use crate::utils::ImageError;
use crate::view::{self, build_overview};

/// A load running on a background thread
struct PendingLoad {
    image: String,
    handle: JoinHandle<Result<(), ImageError>>,
}

/// Start loading `image` on a background thread.
///
/// The guard is claimed inside the thread; a load that loses the race against
/// another one finishes with [`ImageError::AlreadyLoading`].
pub fn load_in_background(
    orchestrator: Arc<Orchestrator>,
    image: String,
) -> JoinHandle<Result<(), ImageError>> {
    thread::spawn(move || orchestrator.handle_action(&ActionRequest::for_image(LOAD_ACTION, image)))
}

/// Show interactive menu
pub fn show_menu(orchestrator: Arc<Orchestrator>, settings: &Settings) -> Result<()> {
    crate::log_info!(
        "Interactive mode for kind cluster '{}'",
        orchestrator.cluster().name
    );

    let mut pending: Vec<PendingLoad> = Vec::new();

    loop {
        reap_finished(&mut pending);

        println!();
        println!("Available actions:");
        println!("  1) Show images");
        println!("  2) Load a docker image into kind");
        println!("  3) Delete an image from kind");
        println!("  4) Exit");
        println!();
        print!("Select an action [1-4]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // stdin closed
            break;
        }

        match input.trim() {
            "1" => print!("{}", build_overview(&orchestrator).render_text()),
            "2" => {
                if let Some(load) = start_load(&orchestrator)? {
                    pending.push(load);
                }
            }
            "3" => delete_interactively(&orchestrator, settings)?,
            "4" => break,
            _ => crate::log_error!("Invalid selection. Please choose 1-4."),
        }
    }

    if !pending.is_empty() {
        println!("Waiting for {} image load(s) to finish...", pending.len());
    }
    for load in pending {
        report(&load.image, load.handle.join());
    }

    crate::log_info!("Exiting...");
    Ok(())
}

fn start_load(orchestrator: &Arc<Orchestrator>) -> Result<Option<PendingLoad>> {
    if orchestrator.is_loading() {
        crate::log_warn!("{}", ImageError::AlreadyLoading);
        println!("An image is already loading, please wait.");
        return Ok(None);
    }

    let images = match orchestrator.docker_images() {
        Ok(images) => images,
        Err(e) => {
            e.display();
            return Ok(None);
        }
    };

    let references: Vec<String> = images.iter().map(|image| image.reference()).collect();
    if references.is_empty() {
        println!("No local docker images found.");
        return Ok(None);
    }

    let Some(index) = crate::utils::select("Image to load into kind", &references)? else {
        return Ok(None);
    };

    let image = references[index].clone();
    println!("{}", view::LOADING_MESSAGE);

    Ok(Some(PendingLoad {
        handle: load_in_background(Arc::clone(orchestrator), image.clone()),
        image,
    }))
}

fn delete_interactively(orchestrator: &Orchestrator, settings: &Settings) -> Result<()> {
    let table = view::kind_table(orchestrator.kind_images());
    if let Some(error) = &table.error {
        crate::log_error!("{}", error);
        return Ok(());
    }

    let labels: Vec<String> = table
        .rows
        .iter()
        .map(|row| row.cells.join("  "))
        .collect();
    if labels.is_empty() {
        println!("{}", table.empty_message);
        return Ok(());
    }

    let Some(index) = crate::utils::select("Image to delete from kind", &labels)? else {
        return Ok(());
    };

    let Some(action) = table.rows[index].action.as_ref() else {
        return Ok(());
    };

    if settings.behavior.confirm_destructive
        && let Some(confirmation) = &action.confirmation
    {
        println!("{}", confirmation.title);
        if !crate::utils::confirm(&confirmation.body)? {
            crate::log_info!("Deletion cancelled");
            return Ok(());
        }
    }

    match orchestrator.handle_action(&action.request()) {
        Ok(()) => println!("✓ Deleted {}", table.rows[index].cells[0]),
        Err(e) => e.display(),
    }

    Ok(())
}

/// Report and drop loads whose threads have finished
fn reap_finished(pending: &mut Vec<PendingLoad>) {
    let mut still_running = Vec::with_capacity(pending.len());

    for load in pending.drain(..) {
        if load.handle.is_finished() {
            report(&load.image, load.handle.join());
        } else {
            still_running.push(load);
        }
    }

    *pending = still_running;
}

fn report(image: &str, outcome: thread::Result<Result<(), ImageError>>) {
    match outcome {
        Ok(Ok(())) => println!("✓ Loaded {} into kind", image),
        Ok(Err(e)) => e.display(),
        Err(_) => crate::log_error!("Load of {} panicked", image),
    }
}
