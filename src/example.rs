//! Code for working with the bundled demo models
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use include_dir::{Dir, DirEntry, include_dir};

/// The directory containing the demo models.
const DEMOS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/demos");

/// Get the names of all examples
pub fn get_example_names() -> impl Iterator<Item = &'static str> {
    DEMOS_DIR.dirs().map(|dir| {
        dir.path()
            .as_os_str()
            .to_str()
            .expect("Invalid unicode in path")
    })
}

/// A bundled example model
pub struct Example(Dir<'static>);

impl Example {
    /// Get the example with the specified name
    pub fn from_name(name: &str) -> Result<Self> {
        let dir = DEMOS_DIR
            .get_dir(name)
            .with_context(|| format!("Example '{name}' not found"))?;

        Ok(Self(dir.clone()))
    }

    /// Get the contents of the readme file for this example
    pub fn get_readme(&self) -> Result<&'static str> {
        self.0
            .get_file(self.0.path().join("README.txt"))
            .context("Missing file")?
            .contents_utf8()
            .context("File not UTF-8 encoded")
    }

    /// Extract this example to a specified destination
    pub fn extract(&self, new_path: &Path) -> Result<()> {
        fs::create_dir(new_path)
            .with_context(|| format!("Could not create directory {}", new_path.display()))?;
        for entry in self.0.entries() {
            match entry {
                DirEntry::Dir(_) => panic!("Subdirectories in examples not supported"),
                DirEntry::File(f) => {
                    let file_name = f.path().file_name().context("Invalid file name")?;
                    fs::write(new_path.join(file_name), f.contents())?;
                }
            }
        }

        Ok(())
    }
}
