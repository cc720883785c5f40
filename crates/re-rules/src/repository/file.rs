//! YAML-file-backed [`RuleRepository`] with `notify`-based hot reload
//! (spec §6). Delegates querying/filtering to an
//! [`InMemoryRuleRepository`] and layers file persistence plus a
//! `rule.changed` event published over [`PubSub`] on top.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};
use uuid::Uuid;

use re_core::error::RulesError;
use re_core::message::Message;
use re_core::ports::{Page, PubSub, RuleFilter, RuleRepository};
use re_core::rule::{Rule, RuleStatus, Schedule};
use re_core::session::Session;

use super::memory::InMemoryRuleRepository;

const CHANGED_CHANNEL: &str = "rule.changed";

pub struct FileRuleRepository {
    dir: PathBuf,
    memory: InMemoryRuleRepository,
    pubsub: Arc<dyn PubSub>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FileRuleRepository {
    /// Load every `*.yml`/`*.yaml` file in `dir` into memory. Creates the
    /// directory if missing; a file that fails to parse is logged and
    /// skipped rather than failing startup.
    pub fn open(dir: PathBuf, pubsub: Arc<dyn PubSub>) -> Result<Self, RulesError> {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| RulesError::repository(e.to_string()))?;
        }
        let memory = InMemoryRuleRepository::new();
        for entry in fs::read_dir(&dir).map_err(|e| RulesError::repository(e.to_string()))? {
            let entry = entry.map_err(|e| RulesError::repository(e.to_string()))?;
            let path = entry.path();
            if !is_yaml(&path) {
                continue;
            }
            match load_file(&path) {
                Ok(rule) => {
                    info!(rule_id = %rule.id, path = %path.display(), "loaded rule");
                    memory.seed(rule);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load rule file"),
            }
        }
        Ok(Self {
            dir,
            memory,
            pubsub,
            watcher: Mutex::new(None),
        })
    }

    /// Start watching the directory for changes made outside the engine
    /// (e.g. an operator editing a YAML file directly). Requires an
    /// active tokio runtime: the watcher callback runs on its own thread
    /// and hands the `rule.changed` publish off to the runtime handle.
    pub fn watch(&self) -> Result<(), RulesError> {
        let dir = self.dir.clone();
        let memory = self.memory.clone();
        let pubsub = self.pubsub.clone();
        let handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => handle_fs_event(&event, &memory, &pubsub, &handle),
            Err(e) => warn!(error = %e, "filesystem watcher error"),
        })
        .map_err(|e| RulesError::repository(e.to_string()))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| RulesError::repository(e.to_string()))?;
        info!(path = %dir.display(), "watching rules directory for changes");
        *self.watcher.lock().unwrap() = Some(watcher);
        Ok(())
    }

    fn write_file(&self, rule: &Rule) -> Result<(), RulesError> {
        let yaml = serde_yaml::to_string(rule).map_err(|e| RulesError::repository(e.to_string()))?;
        let final_path = self.dir.join(format!("{}.yml", rule.id));
        let tmp_path = self.dir.join(format!(".{}.tmp", rule.id));
        fs::write(&tmp_path, yaml).map_err(|e| RulesError::repository(e.to_string()))?;
        fs::rename(&tmp_path, &final_path).map_err(|e| RulesError::repository(e.to_string()))?;
        Ok(())
    }

    fn delete_file(&self, id: Uuid) {
        for ext in ["yml", "yaml"] {
            let path = self.dir.join(format!("{id}.{ext}"));
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(rule_id = %id, error = %e, "failed to delete rule file");
                }
            }
        }
    }

    async fn publish_changed(&self, rule: &Rule) {
        publish_changed(&self.pubsub, rule).await;
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map_or(false, |e| e == "yml" || e == "yaml")
}

fn load_file(path: &Path) -> Result<Rule, RulesError> {
    let contents = fs::read_to_string(path).map_err(|e| RulesError::repository(e.to_string()))?;
    serde_yaml::from_str(&contents).map_err(|e| RulesError::validation(e.to_string()))
}

async fn publish_changed(pubsub: &Arc<dyn PubSub>, rule: &Rule) {
    let payload = serde_json::to_vec(rule).unwrap_or_default();
    let message = Message {
        domain: rule.domain_id.clone(),
        channel: CHANGED_CHANNEL.to_string(),
        subtopic: rule.id.to_string(),
        publisher: "re-repository".to_string(),
        protocol: "re".to_string(),
        created: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        payload,
    };
    if let Err(e) = pubsub.publish(CHANGED_CHANNEL, message).await {
        warn!(rule_id = %rule.id, error = %e, "failed to publish rule change event");
    }
}

fn handle_fs_event(event: &Event, memory: &InMemoryRuleRepository, pubsub: &Arc<dyn PubSub>, handle: &tokio::runtime::Handle) {
    for path in &event.paths {
        if !is_yaml(path) {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()).map_or(false, |n| n.starts_with('.')) {
            continue;
        }
        match &event.kind {
            EventKind::Create(CreateKind::File) | EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Name(_)) => {
                match load_file(path) {
                    Ok(rule) => {
                        info!(rule_id = %rule.id, path = %path.display(), "hot-reloaded rule");
                        memory.seed(rule.clone());
                        let pubsub = pubsub.clone();
                        handle.spawn(async move { publish_changed(&pubsub, &rule).await });
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to parse rule during hot-reload, keeping previous version"),
                }
            }
            EventKind::Remove(RemoveKind::File) => {
                if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| Uuid::parse_str(s).ok()) {
                    memory.drop_rule(id);
                    info!(rule_id = %id, path = %path.display(), "removed rule after file deletion");
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl RuleRepository for FileRuleRepository {
    async fn add_rule(&self, session: &Session, rule: Rule) -> Result<Rule, RulesError> {
        let rule = self.memory.add_rule(session, rule).await?;
        self.write_file(&rule)?;
        self.publish_changed(&rule).await;
        Ok(rule)
    }

    async fn view_rule(&self, session: &Session, id: Uuid) -> Result<Rule, RulesError> {
        self.memory.view_rule(session, id).await
    }

    async fn update_rule(&self, session: &Session, rule: Rule) -> Result<Rule, RulesError> {
        let rule = self.memory.update_rule(session, rule).await?;
        self.write_file(&rule)?;
        self.publish_changed(&rule).await;
        Ok(rule)
    }

    async fn update_rule_tags(&self, session: &Session, id: Uuid, tags: Vec<String>) -> Result<Rule, RulesError> {
        let rule = self.memory.update_rule_tags(session, id, tags).await?;
        self.write_file(&rule)?;
        self.publish_changed(&rule).await;
        Ok(rule)
    }

    async fn update_rule_schedule(&self, session: &Session, id: Uuid, schedule: Option<Schedule>) -> Result<Rule, RulesError> {
        let rule = self.memory.update_rule_schedule(session, id, schedule).await?;
        self.write_file(&rule)?;
        self.publish_changed(&rule).await;
        Ok(rule)
    }

    async fn update_rule_status(&self, session: &Session, id: Uuid, status: RuleStatus) -> Result<Rule, RulesError> {
        let rule = self.memory.update_rule_status(session, id, status).await?;
        self.write_file(&rule)?;
        self.publish_changed(&rule).await;
        Ok(rule)
    }

    async fn remove_rule(&self, session: &Session, id: Uuid) -> Result<(), RulesError> {
        self.memory.remove_rule(session, id).await?;
        self.delete_file(id);
        Ok(())
    }

    async fn update_rule_due(&self, id: Uuid, due: DateTime<Utc>) -> Result<Rule, RulesError> {
        let rule = self.memory.update_rule_due(id, due).await?;
        self.write_file(&rule)?;
        Ok(rule)
    }

    async fn list_rules(&self, session: &Session, filter: RuleFilter) -> Result<Page<Rule>, RulesError> {
        self.memory.list_rules(session, filter).await
    }
}
