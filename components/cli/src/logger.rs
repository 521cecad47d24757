//! `Logger` external collaborator (§6): routes document-facing warnings
//! (dropped duplicate attributes, unknown entities, and the like) to
//! stderr or a file per `-e`.

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;

use sgml_entities::Logger;

pub struct StderrLogger;

impl Logger for StderrLogger {
    fn warn(&self, message: &str) {
        eprintln!("warning: {}", message);
    }
}

pub struct FileLogger {
    file: RefCell<File>,
}

impl FileLogger {
    pub fn create(path: &str) -> std::io::Result<Self> {
        Ok(Self {
            file: RefCell::new(File::create(path)?),
        })
    }
}

impl Logger for FileLogger {
    fn warn(&self, message: &str) {
        let _ = writeln!(self.file.borrow_mut(), "warning: {}", message);
    }
}
