//! File-backed key/value store.
//!
//! The whole store is one TOML document with a table per namespace. Every
//! write rewrites the document atomically (write to a sibling file, fsync,
//! rename) so a power cut leaves either the old or the new state on disk.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::debug;

use crate::error::{HwError, Result};

pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    doc: Table,
}

impl FileKvStore {
    /// Open the store at `path`. A missing file is an empty store; the file
    /// is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = match fs::read_to_string(&path) {
            Ok(text) => text
                .parse::<Table>()
                .map_err(|e| HwError::Storage(format!("parse {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.doc.get(namespace)?.as_table()?.get(key)
    }

    fn put(&mut self, namespace: &str, key: &str, value: Value) -> Result<()> {
        let ns = self
            .doc
            .entry(namespace.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        let Value::Table(table) = ns else {
            return Err(HwError::Storage(format!(
                "namespace {namespace} is not a table"
            )));
        };
        table.insert(key.to_string(), value);
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let text = toml::to_string(&self.doc)
            .map_err(|e| HwError::Storage(format!("serialize: {e}")))?;
        write_atomic(&self.path, text.as_bytes())?;
        debug!(path = %self.path.display(), "state persisted");
        Ok(())
    }
}

impl shelf_traits::KvStore for FileKvStore {
    fn get_bool(
        &self,
        namespace: &str,
        key: &str,
    ) -> std::result::Result<Option<bool>, Box<dyn std::error::Error + Send + Sync>> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(Value::Boolean(b)) => Ok(Some(*b)),
            Some(other) => Err(Box::new(HwError::Storage(format!(
                "{namespace}.{key}: expected bool, found {}",
                other.type_str()
            )))),
        }
    }

    fn get_f32(
        &self,
        namespace: &str,
        key: &str,
    ) -> std::result::Result<Option<f32>, Box<dyn std::error::Error + Send + Sync>> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(Value::Float(f)) => Ok(Some(*f as f32)),
            Some(Value::Integer(i)) => Ok(Some(*i as f32)),
            Some(other) => Err(Box::new(HwError::Storage(format!(
                "{namespace}.{key}: expected float, found {}",
                other.type_str()
            )))),
        }
    }

    fn put_bool(
        &mut self,
        namespace: &str,
        key: &str,
        value: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.put(namespace, key, Value::Boolean(value))?)
    }

    fn put_f32(
        &mut self,
        namespace: &str,
        key: &str,
        value: f32,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.put(namespace, key, Value::Float(f64::from(value)))?)
    }

    fn clear(
        &mut self,
        namespace: &str,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.doc.remove(namespace).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}
