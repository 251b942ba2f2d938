use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    /// A stored revision, `_id` and `_rev` included. Deletes are tombstones.
    Insert { key: String, doc: JsonValue },
}

pub struct Wal {
    path: PathBuf,
    file: File,
}

impl Wal {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("wal-{}.log", Utc::now().timestamp_millis()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// A log over an existing segment opened read-only, so every append fails.
    #[cfg(test)]
    pub(crate) fn read_only(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, rec: &WalRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(rec)?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        Ok(())
    }

    /// Reads every `*.log` segment in name order. Torn or unparsable lines
    /// are skipped.
    pub fn replay(dir: &Path) -> std::io::Result<Vec<WalRecord>> {
        let mut out = Vec::new();
        let rd = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e),
        };
        let mut files: Vec<_> = rd.filter_map(|e| e.ok()).collect();
        files.sort_by_key(|e| e.file_name());
        for f in files {
            let p = f.path();
            if p.extension().and_then(|s| s.to_str()) != Some("log") {
                continue;
            }
            let br = BufReader::new(File::open(&p)?);
            for line in br.lines() {
                let line = line?;
                if let Ok(rec) = serde_json::from_str::<WalRecord>(&line) {
                    out.push(rec);
                }
            }
        }
        Ok(out)
    }
}
