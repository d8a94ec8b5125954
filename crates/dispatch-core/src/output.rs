use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use dispatch_common::{DispatchError, Result};
use serde::Serialize;

use crate::stats::BatchStats;
use crate::store::ResultRecord;

#[derive(Serialize)]
struct ResultLine<'a> {
    id: usize,
    prompt: &'a str,
    response: Option<&'a str>,
}

/// One JSON line per record, in the order given; failures carry `"response": null`.
pub fn write_results(path: impl AsRef<Path>, records: &[ResultRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| output_error(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = ResultLine { id: record.id, prompt: &record.prompt, response: record.response() };
        serde_json::to_writer(&mut writer, &line).map_err(|e| output_error(path, e))?;
        writer.write_all(b"\n").map_err(|e| output_error(path, e))?;
    }
    writer.flush().map_err(|e| output_error(path, e))
}

pub fn write_stats(path: impl AsRef<Path>, stats: &BatchStats) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| output_error(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, stats).map_err(|e| output_error(path, e))?;
    writer.write_all(b"\n").map_err(|e| output_error(path, e))?;
    writer.flush().map_err(|e| output_error(path, e))
}

fn output_error(path: &Path, err: impl Display) -> DispatchError {
    DispatchError::Output { path: path.to_path_buf(), reason: err.to_string() }
}
