//! Lifecycle event protocol shared by the pipeline and its supervisor
//!
//! The pipeline reports every state transition as a single line of the form
//! `CALLBACK <TAG> <arg1> <arg2> ...` on its stdout. The supervisor parses
//! those lines back into [`Event`] values. Anything that does not start
//! with the `CALLBACK` prefix is ordinary diagnostic text and must be
//! ignorable by the parser.
//!
//! Lines are whitespace-tokenized on the reading side, so argument tokens
//! have embedded whitespace replaced with underscores before emission.

use thiserror::Error;

/// Prefix identifying a protocol line.
pub const CALLBACK_PREFIX: &str = "CALLBACK";

/// A lifecycle event emitted by the upload pipeline.
///
/// One variant per protocol tag. Variants carry their wire arguments in
/// wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Packing phase begins.
    PackStart {
        scene_path: String,
        target_path: String,
    },
    /// Packing progress, percent 0-100.
    PackProgress { percent: f64 },
    /// Non-fatal: a referenced asset could not be found while packing.
    MissingFile {
        scene_path: String,
        target_path: String,
        file: String,
    },
    /// Packing finished.
    PackEnd {
        scene_path: String,
        target_path: String,
        success: bool,
    },
    /// Packing failed; fatal to the run.
    PackError {
        scene_path: String,
        target_path: String,
        message: String,
    },
    /// The control plane rejected project creation; fatal.
    ProjectCreationError {
        project_name: String,
        message: String,
    },
    /// Transfer phase begins.
    UploadStart { target_path: String },
    /// Per-file transfer progress, percent 0-100.
    UploadProgress {
        relative_path: String,
        percent: f64,
    },
    /// Transfer phase finished.
    UploadEnd {
        target_path: String,
        success: bool,
    },
    /// A file's transfer failed terminally.
    UploadError {
        relative_path: String,
        message: String,
    },
    /// Unexpected failure, process about to abort.
    Error { message: String },
    /// Final line before process exit.
    End { exit_code: i32 },
}

/// Error produced when a `CALLBACK` line cannot be decoded.
///
/// Reaching this error means the line *claimed* to be a protocol line; the
/// reader is expected to log it and carry on, never to abort.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown protocol tag: {0}")]
    UnknownTag(String),

    #[error("wrong argument count for {tag}: expected {expected}, got {got}")]
    BadArity {
        tag: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("malformed argument for {tag}: {detail}")]
    BadArgument { tag: &'static str, detail: String },
}

impl Event {
    /// The wire tag for this event.
    pub fn tag(&self) -> &'static str {
        match self {
            Event::PackStart { .. } => "PACK_START",
            Event::PackProgress { .. } => "PACK_PROGRESS",
            Event::MissingFile { .. } => "MISSING_FILE",
            Event::PackEnd { .. } => "PACK_END",
            Event::PackError { .. } => "PACK_ERROR",
            Event::ProjectCreationError { .. } => "PROJECT_CREATION_ERROR",
            Event::UploadStart { .. } => "UPLOAD_START",
            Event::UploadProgress { .. } => "UPLOAD_PROGRESS",
            Event::UploadEnd { .. } => "UPLOAD_END",
            Event::UploadError { .. } => "UPLOAD_ERROR",
            Event::Error { .. } => "ERROR",
            Event::End { .. } => "END",
        }
    }

    /// Encode this event as a single protocol line, without a trailing
    /// newline.
    pub fn to_line(&self) -> String {
        let mut parts: Vec<String> = vec![CALLBACK_PREFIX.to_string(), self.tag().to_string()];

        match self {
            Event::PackStart {
                scene_path,
                target_path,
            } => {
                parts.push(sanitize(scene_path));
                parts.push(sanitize(target_path));
            }
            Event::PackProgress { percent } => {
                parts.push(format_percent(*percent));
            }
            Event::MissingFile {
                scene_path,
                target_path,
                file,
            } => {
                parts.push(sanitize(scene_path));
                parts.push(sanitize(target_path));
                parts.push(sanitize(file));
            }
            Event::PackEnd {
                scene_path,
                target_path,
                success,
            } => {
                parts.push(sanitize(scene_path));
                parts.push(sanitize(target_path));
                parts.push(success.to_string());
            }
            Event::PackError {
                scene_path,
                target_path,
                message,
            } => {
                parts.push(sanitize(scene_path));
                parts.push(sanitize(target_path));
                parts.push(sanitize(message));
            }
            Event::ProjectCreationError {
                project_name,
                message,
            } => {
                parts.push(sanitize(project_name));
                parts.push(sanitize(message));
            }
            Event::UploadStart { target_path } => {
                parts.push(sanitize(target_path));
            }
            Event::UploadProgress {
                relative_path,
                percent,
            } => {
                parts.push(sanitize(relative_path));
                parts.push(format_percent(*percent));
            }
            Event::UploadEnd {
                target_path,
                success,
            } => {
                parts.push(sanitize(target_path));
                parts.push(success.to_string());
            }
            Event::UploadError {
                relative_path,
                message,
            } => {
                parts.push(sanitize(relative_path));
                parts.push(sanitize(message));
            }
            Event::Error { message } => {
                parts.push(sanitize(message));
            }
            Event::End { exit_code } => {
                parts.push(exit_code.to_string());
            }
        }

        parts.join(" ")
    }

    /// Decode one line of pipeline output.
    ///
    /// Returns `Ok(None)` for diagnostic lines (anything not starting with
    /// the `CALLBACK` prefix), `Ok(Some(event))` for well-formed protocol
    /// lines, and `Err` for lines that claim to be protocol but cannot be
    /// decoded.
    pub fn parse(line: &str) -> Result<Option<Event>, ParseError> {
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some(CALLBACK_PREFIX) => {}
            _ => return Ok(None),
        }

        let tag = match tokens.next() {
            Some(tag) => tag,
            None => return Err(ParseError::UnknownTag(String::new())),
        };
        let args: Vec<&str> = tokens.collect();

        let event = match tag {
            "PACK_START" => {
                let [scene_path, target_path] = expect_args("PACK_START", &args)?;
                Event::PackStart {
                    scene_path: scene_path.to_string(),
                    target_path: target_path.to_string(),
                }
            }
            "PACK_PROGRESS" => {
                let [percent] = expect_args("PACK_PROGRESS", &args)?;
                Event::PackProgress {
                    percent: parse_percent("PACK_PROGRESS", percent)?,
                }
            }
            "MISSING_FILE" => {
                let [scene_path, target_path, file] = expect_args("MISSING_FILE", &args)?;
                Event::MissingFile {
                    scene_path: scene_path.to_string(),
                    target_path: target_path.to_string(),
                    file: file.to_string(),
                }
            }
            "PACK_END" => {
                let [scene_path, target_path, success] = expect_args("PACK_END", &args)?;
                Event::PackEnd {
                    scene_path: scene_path.to_string(),
                    target_path: target_path.to_string(),
                    success: parse_bool("PACK_END", success)?,
                }
            }
            "PACK_ERROR" => {
                let [scene_path, target_path, message] = expect_args("PACK_ERROR", &args)?;
                Event::PackError {
                    scene_path: scene_path.to_string(),
                    target_path: target_path.to_string(),
                    message: message.to_string(),
                }
            }
            "PROJECT_CREATION_ERROR" => {
                let [project_name, message] = expect_args("PROJECT_CREATION_ERROR", &args)?;
                Event::ProjectCreationError {
                    project_name: project_name.to_string(),
                    message: message.to_string(),
                }
            }
            "UPLOAD_START" => {
                let [target_path] = expect_args("UPLOAD_START", &args)?;
                Event::UploadStart {
                    target_path: target_path.to_string(),
                }
            }
            "UPLOAD_PROGRESS" => {
                let [relative_path, percent] = expect_args("UPLOAD_PROGRESS", &args)?;
                Event::UploadProgress {
                    relative_path: relative_path.to_string(),
                    percent: parse_percent("UPLOAD_PROGRESS", percent)?,
                }
            }
            "UPLOAD_END" => {
                let [target_path, success] = expect_args("UPLOAD_END", &args)?;
                Event::UploadEnd {
                    target_path: target_path.to_string(),
                    success: parse_bool("UPLOAD_END", success)?,
                }
            }
            "UPLOAD_ERROR" => {
                let [relative_path, message] = expect_args("UPLOAD_ERROR", &args)?;
                Event::UploadError {
                    relative_path: relative_path.to_string(),
                    message: message.to_string(),
                }
            }
            "ERROR" => {
                let [message] = expect_args("ERROR", &args)?;
                Event::Error {
                    message: message.to_string(),
                }
            }
            "END" => {
                let [exit_code] = expect_args("END", &args)?;
                Event::End {
                    exit_code: exit_code.parse().map_err(|_| ParseError::BadArgument {
                        tag: "END",
                        detail: format!("exit code '{}' is not an integer", exit_code),
                    })?,
                }
            }
            other => return Err(ParseError::UnknownTag(other.to_string())),
        };

        Ok(Some(event))
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// Replace whitespace in an argument token so the line stays tokenizable.
fn sanitize(token: &str) -> String {
    let sanitized: String = token
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if sanitized.is_empty() {
        // An empty token would shift every later argument over.
        "_".to_string()
    } else {
        sanitized
    }
}

fn format_percent(percent: f64) -> String {
    format!("{:.2}", percent)
}

fn parse_percent(tag: &'static str, token: &str) -> Result<f64, ParseError> {
    token.parse().map_err(|_| ParseError::BadArgument {
        tag,
        detail: format!("percent '{}' is not a number", token),
    })
}

fn parse_bool(tag: &'static str, token: &str) -> Result<bool, ParseError> {
    match token {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ParseError::BadArgument {
            tag,
            detail: format!("'{}' is not a boolean", other),
        }),
    }
}

fn expect_args<'a, const N: usize>(
    tag: &'static str,
    args: &[&'a str],
) -> Result<[&'a str; N], ParseError> {
    <[&str; N]>::try_from(args.to_vec()).map_err(|_| ParseError::BadArity {
        tag,
        expected: N,
        got: args.len(),
    })
}
