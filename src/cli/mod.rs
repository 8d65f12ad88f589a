//! Command-line interface module
//!
//! This module contains the implementations for the CLI subcommands.

pub mod analyze;
pub mod optimize;
pub mod policies;

/// Common CLI utilities
pub mod utils {
    use crate::error::Result;
    use crate::program::{Program, ProgramFile};
    use crate::proxy::RedirectionTable;
    use std::path::{Path, PathBuf};

    /// Read a serialized program and validate its trees
    pub fn read_program(path: &Path) -> Result<Program> {
        let text = std::fs::read_to_string(path)?;
        let file: ProgramFile = serde_json::from_str(&text)?;
        Program::from_file(file)
    }

    /// Load a policy table, or an empty one when no path is given
    pub fn read_policies(path: Option<&Path>) -> Result<RedirectionTable> {
        match path {
            Some(path) => RedirectionTable::from_json(&std::fs::read_to_string(path)?),
            None => Ok(RedirectionTable::empty()),
        }
    }

    /// Write output to file or stdout
    pub fn write_output(content: &str, output_path: Option<&PathBuf>) -> Result<()> {
        match output_path {
            Some(path) => Ok(std::fs::write(path, content)?),
            None => {
                println!("{}", content);
                Ok(())
            }
        }
    }
}
