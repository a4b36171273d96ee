// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for command-line users.
//
// Every technical error is mapped to a short plain-English summary with a
// concrete next step. Severity drives the exit message shown by the CLI.

use crate::error::LesewerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or timeout; running the command again may work.
    Transient,
    /// User must do something (set a key, download a model, fix the config).
    ActionRequired,
    /// Cannot be fixed by retrying, e.g. a damaged file.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What the user should try next.
    pub suggestion: String,
    /// Whether retrying the same command could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

impl std::fmt::Display for HumanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n  {}", self.message, self.suggestion)
    }
}

/// Convert a `LesewerkError` into a `HumanError`.
pub fn humanize_error(err: &LesewerkError) -> HumanError {
    match err {
        // -- Document errors --
        LesewerkError::UnsupportedDocument(detail) => HumanError {
            message: "This type of document isn't supported.".into(),
            suggestion: format!(
                "Use a PDF, TIFF, GIF, PNG, or JPEG file. (File type: {detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        LesewerkError::PdfError(_) => HumanError {
            message: "There's a problem with this PDF file.".into(),
            suggestion: "The file may be damaged or encrypted. Try re-exporting it, or scan it to an image.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        LesewerkError::ImageError(_) => HumanError {
            message: "There's a problem with this image.".into(),
            suggestion: "The image may be damaged or in an unusual format. Try saving it as a PNG first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Model errors --
        LesewerkError::Segmentation(detail) => HumanError {
            message: "Page segmentation failed.".into(),
            suggestion: format!("Check that the model and its label file match. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        LesewerkError::ModelNotFound(path) => HumanError {
            message: "The segmentation model file is missing.".into(),
            suggestion: format!(
                "Place the model at {path}, or set LESEWERK_SEGMENTATION_MODEL_PATH to its location."
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        LesewerkError::UnknownModel { name, available } => HumanError {
            message: format!("There is no model called \"{name}\"."),
            suggestion: format!("Choose one of: {available}."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        LesewerkError::OcrError(detail) => humanize_remote_detail(
            "Text recognition didn't work on this document.",
            "Check the OCR endpoint and key (LESEWERK_OCR_ENDPOINT / LESEWERK_OCR_KEY).",
            detail,
        ),

        LesewerkError::Llm(detail) => humanize_remote_detail(
            "The language model request failed.",
            "Check the LLM endpoint, key, and model name (LESEWERK_LLM_ENDPOINT / LESEWERK_LLM_KEY).",
            detail,
        ),

        LesewerkError::Http { status, detail } => humanize_http(*status, detail),

        // -- Configuration / persistence --
        LesewerkError::Config(detail) => HumanError {
            message: "The configuration is not valid.".into(),
            suggestion: format!("Fix the configuration file and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        LesewerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "Check the path and try again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "Lesewerk doesn't have permission to access that file.".into(),
                    suggestion: "Check the file permissions, or copy the file somewhere readable first.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        LesewerkError::Serialization(_) => HumanError {
            message: "Some data could not be read or written as JSON.".into(),
            suggestion: "Check that configuration and label files are valid JSON.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

/// OCR and LLM failures usually wrap an HTTP problem; surface the useful part.
fn humanize_remote_detail(message: &str, fallback: &str, detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("api key") || lower.contains("401") || lower.contains("403") {
        HumanError {
            message: message.into(),
            suggestion: "The service rejected the credentials. Check the API key.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("timed out") || lower.contains("429") || lower.contains("rate limit") {
        HumanError {
            message: message.into(),
            suggestion: "The service is busy. Wait a moment and run the command again.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else {
        HumanError {
            message: message.into(),
            suggestion: format!("{fallback} (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

fn humanize_http(status: Option<u16>, detail: &str) -> HumanError {
    match status {
        Some(401) | Some(403) => HumanError {
            message: "The remote service rejected our credentials.".into(),
            suggestion: "Check the API key in the configuration or environment.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        Some(404) => HumanError {
            message: "The remote service address was not found.".into(),
            suggestion: "Check the endpoint URL, model name, and API version.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        Some(429) => HumanError {
            message: "The remote service is rate limiting us.".into(),
            suggestion: "Wait a minute and run the command again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        Some(code) if code >= 500 => HumanError {
            message: "The remote service had an internal error.".into(),
            suggestion: "Try again later.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        _ => HumanError {
            message: "A request to a remote service failed.".into(),
            suggestion: format!("Check your network connection and try again. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
