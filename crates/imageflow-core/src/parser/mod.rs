//! KDL parser
//!
//! Parses `imageflow.kdl` into a [`Project`]. Nodes the parser does not know
//! are skipped. Images missing from the file fall back to the default layout.

use crate::error::{FlowError, Result};
use crate::model::{BaseRef, DEFAULT_BASE_VARIABLE, ImageSpec, Project};
use kdl::{KdlDocument, KdlNode};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the project file
pub const PROJECT_FILE: &str = "imageflow.kdl";

/// Parse a project file
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Project> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// Load the project at `root`, falling back to the default layout when the
/// root has no project file
pub fn load_project(root: &Path) -> Result<Project> {
    let file = root.join(PROJECT_FILE);
    let project = if file.exists() {
        tracing::debug!(file = %file.display(), "Loading project file");
        parse_kdl_file(&file)?
    } else {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed");
        tracing::debug!(root = %root.display(), "No project file, using default layout");
        Project::default_layout(name)
    };
    project.validate()?;
    Ok(project)
}

/// Parse a project from a KDL string
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Project> {
    let doc: KdlDocument = content.parse()?;
    let mut project = Project::default_layout(default_name);
    let mut images = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(name) = first_string(node) {
                    project.name = name;
                }
            }
            "packer" => project.packer_dir = PathBuf::from(required_string(node)?),
            "artifacts" => project.artifacts_dir = PathBuf::from(required_string(node)?),
            "output" => project.output_dir = required_string(node)?,
            "image" => images.push(parse_image(node)?),
            "publish" => parse_publish(node, &mut project)?,
            "validate" => parse_validate(node, &mut project)?,
            _ => {}
        }
    }

    if !images.is_empty() {
        project.images = images;
    }

    Ok(project)
}

fn parse_image(node: &KdlNode) -> Result<ImageSpec> {
    let name = first_string(node)
        .ok_or_else(|| FlowError::InvalidConfig("image requires a name".to_string()))?;
    let mut image = ImageSpec::new(name, String::new());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "template" => image.template = required_string(child)?,
                "var" | "variable" => {
                    let args = string_args(child);
                    match args.as_slice() {
                        [key, value] => {
                            image.variables.insert(key.clone(), value.clone());
                        }
                        _ => {
                            return Err(FlowError::InvalidConfig(format!(
                                "image '{}': var takes a name and a value",
                                image.name
                            )));
                        }
                    }
                }
                "base" => {
                    let base = required_string(child)?;
                    let variable = child
                        .get("var")
                        .and_then(|v| v.as_string())
                        .unwrap_or(DEFAULT_BASE_VARIABLE)
                        .to_string();
                    image.base = Some(BaseRef {
                        image: base,
                        variable,
                    });
                }
                _ => {}
            }
        }
    }

    if image.template.is_empty() {
        image.template = format!("{}.pkr.hcl", image.name);
    }

    Ok(image)
}

fn parse_publish(node: &KdlNode, project: &mut Project) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        match child.name().value() {
            "bucket" => project.publish.bucket = Some(required_string(child)?),
            "compartment" | "compartment-id" | "compartment_id" => {
                project.publish.compartment = Some(required_string(child)?)
            }
            "region" => project.publish.region = required_string(child)?,
            "profile" => project.publish.profile = required_string(child)?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_validate(node: &KdlNode, project: &mut Project) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        if let "max-image-size-gb" | "max_image_size_gb" | "max-size-gb" = child.name().value() {
            let value = child
                .entries()
                .iter()
                .find(|e| e.name().is_none())
                .and_then(|e| e.value().as_integer())
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    FlowError::InvalidConfig(
                        "max-image-size-gb requires a positive integer".to_string(),
                    )
                })?;
            project.validate.max_image_size_gb = u64::try_from(value).map_err(|_| {
                FlowError::InvalidConfig(format!("max-image-size-gb out of range: {}", value))
            })?;
        }
    }
    Ok(())
}

/// Positional string arguments of a node
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

fn first_string(node: &KdlNode) -> Option<String> {
    string_args(node).into_iter().next()
}

fn required_string(node: &KdlNode) -> Result<String> {
    first_string(node).ok_or_else(|| {
        FlowError::InvalidConfig(format!("{} requires a string value", node.name().value()))
    })
}
