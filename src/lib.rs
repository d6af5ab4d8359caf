#![allow(clippy::type_complexity)]

use std::path::Path;

use derive_more::Display;
use tensorboard_rs::summary_writer::SummaryWriter;

pub mod brains;
pub mod envs;
pub mod error;
pub mod hparams;

pub use error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub struct Timestamp(String);

impl Default for Timestamp {
    fn default() -> Self {
        Self(format!("{}", chrono::Local::now().format("%Y%m%d%H%M%S")))
    }
}

/// TensorBoard scalar sink. A default writer drops everything until `init` is called.
#[derive(Default)]
pub struct TbWriter(Option<SummaryWriter>);

impl TbWriter {
    pub fn init(&mut self, name: Option<&str>, run_dir: impl AsRef<Path>) {
        let mut dir = run_dir.as_ref().join("tb");
        if let Some(name) = name {
            dir = dir.join(name);
        }
        self.0 = Some(SummaryWriter::new(dir.to_string_lossy().as_ref()));
    }

    pub fn add_scalar(&mut self, tag: &str, scalar: f32, step: usize) {
        if let Some(writer) = self.0.as_mut() {
            writer.add_scalar(tag, scalar, step);
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.0.as_mut() {
            writer.flush();
        }
    }
}
