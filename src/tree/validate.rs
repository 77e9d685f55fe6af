use super::{ConfigTree, TreeError};
use crate::compiler::{CompileError, ParameterCompiler};
use crate::models::CreateConfigfileRequest;
use crate::utils::is_safe_filename;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl ValidationError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

impl From<TreeError> for ValidationError {
    fn from(e: TreeError) -> Self {
        Self::invalid("parent_id", e.to_string())
    }
}

/// Structural checks of a configfile's attributes against the tree.
/// `id` is the node being updated, `None` on create.
pub fn check_attributes(tree: &ConfigTree, id: Option<i64>, req: &CreateConfigfileRequest) -> Result<(), ValidationError> {
    if req.name.trim().is_empty() {
        return Err(ValidationError::invalid("name", "is required"));
    }
    if req.device.is_none() {
        return Err(ValidationError::Compile(CompileError::MissingDeviceClass));
    }

    for (field, file) in [("firmware", &req.firmware), ("cvc", &req.cvc)] {
        if !file.is_empty() && !is_safe_filename(file) {
            return Err(ValidationError::invalid(field, format!("invalid file name '{}'", file)));
        }
    }

    if let Some(parent_id) = req.parent_id {
        match tree.get(parent_id) {
            None => return Err(ValidationError::invalid("parent_id", format!("configfile {} does not exist", parent_id))),
            Some(parent) if parent.is_deleted() => {
                return Err(ValidationError::invalid("parent_id", format!("configfile {} is deleted", parent_id)))
            }
            Some(_) => {}
        }
        if let Some(id) = id {
            if tree.would_create_cycle(id, parent_id) {
                return Err(ValidationError::invalid(
                    "parent_id",
                    format!("setting parent {} would create a cycle", parent_id),
                ));
            }
        }
    }

    Ok(())
}

/// Full validation: structural checks, then the effective text the node
/// would have must compile for its device class.
pub async fn validate_configfile(
    tree: &ConfigTree,
    compiler: &ParameterCompiler,
    id: Option<i64>,
    req: &CreateConfigfileRequest,
) -> Result<(), ValidationError> {
    check_attributes(tree, id, req)?;

    let text = tree.effective_text_under(req.parent_id, &req.text)?;
    match compiler.validate(req.device, &text).await {
        // line numbers count the merged text, not the node's own
        Err(CompileError::Compilation(msg)) if req.parent_id.is_some() => Err(CompileError::Compilation(
            format!("{} (line counted in the effective text, inherited lines included)", msg),
        )
        .into()),
        other => other.map_err(Into::into),
    }
}
