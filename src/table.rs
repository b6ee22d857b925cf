//! Comma-delimited table files with a header row.
//!
//! Rows are kept as raw cell text so a rewrite preserves column order and the
//! exact content of rows it does not touch. Whole-file rewrites go through
//! [`StagedWrite`]: every file is written to a temporary sibling first and
//! only renamed into place once all of them are on disk.

use crate::error::{GradebookError, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based line the record starts on in the source file.
    pub line: usize,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub file: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

/// Splits `text` into records paired with their 1-based starting line. Line
/// breaks inside quoted cells stay part of the record.
fn split_records(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut start = 1usize;
    for ch in text.chars() {
        match ch {
            '"' => {
                // An escaped quote toggles twice, leaving the state unchanged.
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            '\n' => {
                line += 1;
                if in_quotes {
                    buf.push(ch);
                } else {
                    if buf.ends_with('\r') {
                        buf.pop();
                    }
                    out.push((start, std::mem::take(&mut buf)));
                    start = line;
                }
            }
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() {
        if buf.ends_with('\r') {
            buf.pop();
        }
        out.push((start, buf));
    }
    out
}

fn render_record<S: AsRef<str>>(cells: &[S]) -> String {
    cells
        .iter()
        .map(|c| csv_quote(c.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

impl Table {
    pub fn read(path: &Path) -> Result<Table> {
        let text = std::fs::read_to_string(path).map_err(|e| GradebookError::io(path, e))?;
        Table::parse(&file_label(path), &text)
    }

    pub fn parse(file: &str, text: &str) -> Result<Table> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut headers: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for (line, record) in split_records(text) {
            if record.trim().is_empty() {
                continue;
            }
            let cells = parse_csv_record(&record);
            if headers.is_none() {
                headers = Some(cells.into_iter().map(|h| h.trim().to_string()).collect());
                continue;
            }
            rows.push(Row { line, cells });
        }
        let Some(headers) = headers else {
            return Err(GradebookError::Malformed {
                file: file.to_string(),
                line: 1,
                reason: "missing header row".to_string(),
            });
        };
        Ok(Table {
            file: file.to_string(),
            headers,
            rows,
        })
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| GradebookError::Malformed {
                file: self.file.clone(),
                line: 1,
                reason: format!("missing column '{name}'"),
            })
    }

    pub fn cell<'a>(&self, row: &'a Row, col: usize) -> Result<&'a str> {
        row.cells
            .get(col)
            .map(|c| c.as_str())
            .ok_or_else(|| GradebookError::Malformed {
                file: self.file.clone(),
                line: row.line,
                reason: format!("expected {} cells, found {}", self.headers.len(), row.cells.len()),
            })
    }

    pub fn int_cell(&self, row: &Row, col: usize) -> Result<i64> {
        let raw = self.cell(row, col)?;
        raw.trim().parse::<i64>().map_err(|_| GradebookError::Malformed {
            file: self.file.clone(),
            line: row.line,
            reason: format!("'{}' is not an integer in column '{}'", raw, self.headers[col]),
        })
    }

    /// Keeps rows for which `keep` returns true; returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&Row) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| keep(r));
        before - self.rows.len()
    }

    /// Drops rows whose integer cells in `cols` satisfy `hit`. Every row is
    /// parsed before anything is dropped, so a malformed row leaves the table
    /// unchanged.
    pub fn drop_where(&mut self, cols: &[usize], hit: impl Fn(&[i64]) -> bool) -> Result<usize> {
        let mut doomed = HashSet::new();
        for row in &self.rows {
            let values = cols
                .iter()
                .map(|c| self.int_cell(row, *c))
                .collect::<Result<Vec<i64>>>()?;
            if hit(&values) {
                doomed.insert(row.line);
            }
        }
        Ok(self.retain(|r| !doomed.contains(&r.line)))
    }

    pub fn render(&self) -> String {
        let mut out = render_record(&self.headers);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&render_record(&row.cells));
            out.push('\n');
        }
        out
    }
}

/// Creates `path` holding only a header row. Existing files are left alone.
pub fn ensure_file(path: &Path, headers: &[&str]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GradebookError::io(parent, e))?;
    }
    let mut text = render_record(headers);
    text.push('\n');
    std::fs::write(path, text).map_err(|e| GradebookError::io(path, e))?;
    Ok(true)
}

/// Appends one record, laid out in the file's own header order.
pub fn append_record(path: &Path, fields: &[(&str, String)]) -> Result<()> {
    let table = Table::read(path)?;
    let mut cells = Vec::with_capacity(table.headers.len());
    for h in &table.headers {
        let value = fields
            .iter()
            .find(|(name, _)| *name == h.as_str())
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        cells.push(value);
    }
    for (name, _) in fields {
        table.column(name)?;
    }

    let mut f = OpenOptions::new()
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| GradebookError::io(path, e))?;
    let needs_newline = ends_without_newline(&mut f).map_err(|e| GradebookError::io(path, e))?;
    let mut line = String::new();
    if needs_newline {
        line.push('\n');
    }
    line.push_str(&render_record(&cells));
    line.push('\n');
    f.write_all(line.as_bytes())
        .and_then(|_| f.flush())
        .map_err(|e| GradebookError::io(path, e))
}

fn ends_without_newline(f: &mut File) -> std::io::Result<bool> {
    let len = f.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    f.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// A set of whole-file replacements committed together.
#[derive(Debug, Default)]
pub struct StagedWrite {
    pending: Vec<(PathBuf, PathBuf)>,
}

impl StagedWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_table(&mut self, path: &Path, table: &Table) -> Result<()> {
        self.stage_bytes(path, table.render().as_bytes())
    }

    pub fn stage_bytes(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = temp_sibling(path);
        let mut f = File::create(&tmp).map_err(|e| GradebookError::io(&tmp, e))?;
        // Track before writing so a failed write still gets cleaned up.
        self.pending.push((tmp.clone(), path.to_path_buf()));
        f.write_all(bytes)
            .and_then(|_| f.sync_all())
            .map_err(|e| GradebookError::io(&tmp, e))
    }

    /// Renames every staged file into place, in staging order.
    pub fn commit(mut self) -> Result<()> {
        while !self.pending.is_empty() {
            let (tmp, dst) = self.pending.remove(0);
            if let Err(e) = std::fs::rename(&tmp, &dst) {
                let _ = std::fs::remove_file(&tmp);
                return Err(GradebookError::io(&dst, e));
            }
        }
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        for (tmp, _) in self.pending.drain(..) {
            let _ = std::fs::remove_file(tmp);
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = format!(".{}.{}.tmp", file_label(path), Uuid::new_v4().simple());
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}
