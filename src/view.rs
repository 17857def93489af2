//! Overview tables: docker images, kind images and the loading indicator

use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::k8s::actions::{ActionRequest, DELETE_ACTION, IMAGE_ID_KEY, LOAD_ACTION, Orchestrator};
use crate::k8s::images::{DockerImageRecord, KindImageRecord};
use crate::utils::ImageError;

pub const OVERVIEW_TITLE: &str = "Local Images";
pub const LOADING_MESSAGE: &str = "Started loading image in to kind...";
const EMPTY_MESSAGE: &str = "No images found";

const DOCKER_COLUMNS: [&str; 5] = ["Repository", "Tag", "Image ID", "Created", "Size"];
const KIND_COLUMNS: [&str; 3] = ["Image", "Image ID", "Size"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStyle {
    Primary,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub title: String,
    pub body: String,
}

/// An action attached to a table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowAction {
    pub name: String,
    pub action_path: String,
    pub payload: Map<String, Value>,
    pub style: ActionStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
}

impl RowAction {
    fn new(name: &str, action: &str, image_id: String, style: ActionStyle) -> Self {
        let mut payload = Map::new();
        payload.insert("action".to_string(), Value::String(action.to_string()));
        payload.insert(IMAGE_ID_KEY.to_string(), Value::String(image_id));

        Self {
            name: name.to_string(),
            action_path: action.to_string(),
            payload,
            style,
            confirmation: None,
        }
    }

    /// The request the host dispatches when this action is triggered
    pub fn request(&self) -> ActionRequest {
        ActionRequest::new(self.action_path.clone(), self.payload.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// Cell text, in the order of the owning table's columns
    pub cells: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RowAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub title: String,
    pub empty_message: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub is_loading: bool,
    /// Set when the inventory behind this table could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Table {
    fn new(title: &str, columns: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            empty_message: EMPTY_MESSAGE.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            is_loading: false,
            error: None,
        }
    }

    /// Cell text of `row` under `column`
    pub fn cell<'a>(&self, row: &'a Row, column: &str) -> Option<&'a str> {
        let index = self.columns.iter().position(|c| c == column)?;
        row.cells.get(index).map(String::as_str)
    }

    fn render_text(&self, out: &mut String) {
        out.push_str(&format!("{}\n", self.title.bold()));

        if let Some(error) = &self.error {
            out.push_str(&format!("{} {}\n", "✗".red(), error.red()));
        }

        if self.rows.is_empty() {
            out.push_str(&format!("  {}\n", self.empty_message.dimmed()));
            return;
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(&row.cells) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let header = pad_line(self.columns.iter().map(String::as_str), &widths);
        out.push_str(&format!("  {}\n", header.cyan().bold()));
        for row in &self.rows {
            out.push_str(&format!("  {}\n", pad_line(row.cells.iter().map(String::as_str), &widths)));
        }
    }
}

fn pad_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join("   ")
        .trim_end()
        .to_string()
}

/// Everything a render request produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub title: String,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading_message: Option<String>,
    pub docker: Table,
    pub kind: Table,
}

impl Overview {
    /// Assemble the overview from already-fetched inventories
    pub fn new(
        loading: bool,
        docker: Result<Vec<DockerImageRecord>, ImageError>,
        kind: Result<Vec<KindImageRecord>, ImageError>,
    ) -> Self {
        let mut kind = kind_table(kind);
        kind.is_loading = loading;

        Self {
            title: OVERVIEW_TITLE.to_string(),
            loading,
            loading_message: loading.then(|| LOADING_MESSAGE.to_string()),
            docker: docker_table(docker),
            kind,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();

        if let Some(message) = &self.loading_message {
            out.push_str(&format!("{}\n\n", message.yellow().bold()));
        }

        self.docker.render_text(&mut out);
        out.push('\n');
        self.kind.render_text(&mut out);
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Query both inventories fresh and build the overview.
///
/// The loading flag is read once, after the reads, so the indicator reflects
/// the most recent state.
pub fn build_overview(orchestrator: &Orchestrator) -> Overview {
    let docker = orchestrator.docker_images();
    let kind = orchestrator.kind_images();

    for err in [docker.as_ref().err(), kind.as_ref().err()].into_iter().flatten() {
        crate::log_warn!("Inventory read failed: {}", err);
    }

    Overview::new(orchestrator.is_loading(), docker, kind)
}

pub fn docker_row(image: &DockerImageRecord) -> Row {
    Row {
        cells: vec![
            image.repository.clone(),
            image.tag.clone(),
            image.id.clone(),
            image.created_since.clone(),
            image.size.clone(),
        ],
        action: Some(RowAction::new(
            "Load into Kind",
            LOAD_ACTION,
            image.reference(),
            ActionStyle::Primary,
        )),
    }
}

pub fn kind_row(image: &KindImageRecord, repo_tag: &str) -> Row {
    let mut action = RowAction::new("Delete", DELETE_ACTION, image.id.clone(), ActionStyle::Danger);
    action.confirmation = Some(Confirmation {
        title: "Are you sure?".to_string(),
        body: format!("Do you want to delete {} from your kind images?", repo_tag),
    });

    Row {
        cells: vec![repo_tag.to_string(), image.id.clone(), image.size.clone()],
        action: Some(action),
    }
}

pub fn docker_table(images: Result<Vec<DockerImageRecord>, ImageError>) -> Table {
    let mut table = Table::new("Docker Images", &DOCKER_COLUMNS);
    match images {
        Ok(images) => table.rows = images.iter().map(docker_row).collect(),
        Err(e) => table.error = Some(e.to_string()),
    }
    table
}

pub fn kind_table(images: Result<Vec<KindImageRecord>, ImageError>) -> Table {
    let mut table = Table::new("Kind Images", &KIND_COLUMNS);
    match images {
        Ok(images) => {
            table.rows = images
                .iter()
                .flat_map(|image| image.display_rows())
                .map(|(tag, image)| kind_row(image, tag))
                .collect();
        }
        Err(e) => table.error = Some(e.to_string()),
    }
    table
}
