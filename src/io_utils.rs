//! File helpers shared by the schema writer, the warehouse, and the report.
//!
//! - **Atomic replace**: [`write_atomic`] writes the full buffer to a sibling
//!   `.tmp` file and renames it over the destination, so readers never see a
//!   half-written schema or table file.
//! - **stdout**: the `-` path convention routes CSV output to standard out.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp = temp_sibling(path);
    let result = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn open_csv_writer(path: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(path) if !is_dash(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
        )),
        _ => Box::new(BufWriter::new(io::stdout())),
    };
    Ok(csv::WriterBuilder::new().from_writer(writer))
}
