//! Open and SaveAs of SQLite document files.
//!
//! # Invariants
//! - A failed open leaves the model released, never half loaded.
//! - Conversion and bookkeeping done while opening are not undoable.
//! - SaveAs always writes the versions of this binary.

use super::copy_paste;
use super::partition::Partition;
use super::version::{self, ConversionChain, Converter, ACTUAL_VERSION_FRAMEWORK, VERSION_NOT_BOUND};
use super::{BaseModel, ModelError, ModelResult, ModelSchema, ModelStatus, VersionStatus};
use crate::db::open_db;
use crate::document::{DocResult, Document};
use crate::label::LabelStore;
use crate::logbook::LogBook;
use crate::repo::{DocumentRepository, SqliteDocumentRepository};
use crate::tx::TxError;
use log::{error, info, warn};
use std::path::Path;
use std::time::Instant;

impl<S: ModelSchema> BaseModel<S> {
    /// Loads the document stored at `path`.
    ///
    /// Returns `Ok` or `LessOk`; every failed check releases the model and
    /// reports the status through [`ModelError::Version`].
    pub fn open(&mut self, path: impl AsRef<Path>) -> ModelResult<VersionStatus> {
        let started_at = Instant::now();
        let path = path.as_ref();
        info!("event=model_open module=model status=start path={}", path.display());

        match self.open_checked(path) {
            Ok(status) => {
                info!(
                    "event=model_open module=model status=ok version_status={:?} duration_ms={}",
                    status,
                    started_at.elapsed().as_millis()
                );
                Ok(status)
            }
            Err(err) => {
                error!(
                    "event=model_open module=model status=error version_status={:?} duration_ms={} error={}",
                    self.version_status,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Writes the whole document to `path`, replacing its previous content.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> ModelResult<usize> {
        let started_at = Instant::now();
        let path = path.as_ref();
        info!("event=model_save module=model status=start path={}", path.display());

        match self.save_checked(path) {
            Ok(count) => {
                self.status.insert(ModelStatus::SAVED);
                self.status.remove(ModelStatus::MODIFIED);
                info!(
                    "event=model_save module=model status=ok labels={} duration_ms={}",
                    count,
                    started_at.elapsed().as_millis()
                );
                Ok(count)
            }
            Err(err) => {
                error!(
                    "event=model_save module=model status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn save_checked(&mut self, path: &Path) -> ModelResult<usize> {
        self.ensure_initialized()?;
        if self.doc.has_open_command() {
            return Err(TxError::CommandStillOpen.into());
        }
        let actual_app = self.schema.actual_version_app();
        self.doc
            .untracked(|doc| version::bind_version_info(doc, actual_app))?;

        let mut conn = open_db(path)?;
        let mut repo = SqliteDocumentRepository::try_new(&mut conn)?;
        Ok(repo.save_store(self.doc.store())?)
    }

    fn open_checked(&mut self, path: &Path) -> ModelResult<VersionStatus> {
        let store = match load_store(path) {
            Ok(store) => store,
            Err(err) => {
                self.release(VersionStatus::Undefined);
                return Err(err);
            }
        };
        self.release(VersionStatus::Undefined);
        self.doc = Document::with_store(store, self.config.tx_mode, self.config.undo_limit);
        self.init_registries();

        let stored_fw = version::stored_version_framework(&self.doc);
        let stored_app = version::stored_version_app(&self.doc);
        let actual_app = self.schema.actual_version_app();
        if stored_fw == VERSION_NOT_BOUND || stored_app == VERSION_NOT_BOUND {
            return Err(self.fail_open(VersionStatus::NotBoundFail));
        }
        if stored_fw > ACTUAL_VERSION_FRAMEWORK || stored_app > actual_app {
            return Err(self.fail_open(VersionStatus::HigherFail));
        }

        let type_ids: Vec<u32> = self.node_types.keys().copied().collect();
        let prepared = self.doc.untracked(|doc| -> DocResult<()> {
            copy_paste::release_buffer(doc)?;
            LogBook::new().release_all(doc)?;
            for type_id in type_ids {
                Partition::new(type_id).init(doc)?;
            }
            Ok(())
        });
        if let Err(err) = prepared {
            self.release(VersionStatus::Undefined);
            return Err(err.into());
        }

        let mut status = VersionStatus::Ok;
        if stored_fw < ACTUAL_VERSION_FRAMEWORK {
            let chain = ConversionChain::new();
            let converted = self
                .doc
                .untracked(|doc| chain.perform(doc, stored_fw, ACTUAL_VERSION_FRAMEWORK));
            if !converted {
                return Err(self.fail_open(VersionStatus::LessFail));
            }
            status = VersionStatus::LessOk;
        }
        if stored_app < actual_app {
            let converted = match self.schema.converter_app() {
                Some(converter) => self
                    .doc
                    .untracked(|doc| converter.perform(doc, stored_app, actual_app)),
                None => false,
            };
            if !converted {
                warn!(
                    "event=model_open module=model status=conversion_failed stored_app={} actual_app={}",
                    stored_app, actual_app
                );
                return Err(self.fail_open(VersionStatus::LessFail));
            }
            status = VersionStatus::LessOk;
        }

        if !self.check_well_formed() {
            if status == VersionStatus::LessOk {
                return Err(self.fail_open(VersionStatus::LessFail));
            }
            self.release(VersionStatus::Undefined);
            return Err(ModelError::MalformedDocument);
        }

        let was_tracking = self.doc.is_transaction_mode_on();
        self.doc.disable_transactions();
        self.func_reconnect_all();
        if was_tracking {
            self.doc.enable_transactions();
        }

        self.status = ModelStatus::INITIALIZED;
        if status == VersionStatus::LessOk {
            self.status.insert(ModelStatus::MODIFIED);
        }
        self.version_status = status;
        Ok(status)
    }

    fn fail_open(&mut self, status: VersionStatus) -> ModelError {
        warn!("event=model_open module=model status=refused version_status={:?}", status);
        self.release(status);
        ModelError::Version(status)
    }
}

fn load_store(path: &Path) -> ModelResult<LabelStore> {
    let mut conn = open_db(path)?;
    let repo = SqliteDocumentRepository::try_new(&mut conn)?;
    Ok(repo.load_store()?)
}

#[cfg(test)]
mod tests {
    use crate::model::{BaseModel, ModelConfig, ModelError, ModelSchema, ModelStatus, NodeType, VersionStatus};
    use crate::tx::TxData;

    struct Notes;

    impl ModelSchema for Notes {
        fn node_types(&self) -> Vec<(u32, NodeType)> {
            vec![(4, NodeType::new("Note"))]
        }

        fn actual_version_app(&self) -> i32 {
            3
        }
    }

    #[test]
    fn save_refuses_an_open_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut model = BaseModel::new(Notes, ModelConfig::default());
        model.new_empty().expect("new empty");
        model.open_command().expect("open");
        assert!(matches!(
            model.save_as(dir.path().join("doc.sqlite")),
            Err(ModelError::Tx(_))
        ));
        model.commit_command(TxData::named("noop")).expect("commit");
    }

    #[test]
    fn saved_model_reopens_with_ok_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.sqlite");

        let mut model = BaseModel::new(Notes, ModelConfig::default());
        model.new_empty().expect("new empty");
        model.open_command().expect("open");
        model.add_node(4, "first").expect("node");
        model.commit_command(TxData::named("add")).expect("commit");
        assert!(model.is_modified());
        model.save_as(&path).expect("save");
        assert!(model.status().contains(ModelStatus::SAVED));
        assert!(!model.is_modified());

        let mut reopened = BaseModel::new(Notes, ModelConfig::default());
        assert_eq!(reopened.open(&path).expect("open"), VersionStatus::Ok);
        assert!(reopened.is_initialized());
        assert_eq!(reopened.nb_undos(), 0);
        assert!(reopened.find_node_by_name("first").is_some());
    }
}
