use anyhow::{bail, Result};
use chrono::SecondsFormat;

use crate::{
    app::{AppFactory, MemoryService},
    config::Config,
    memory::{ActivityRecord, DeleteRequest, DeleteStatus},
};

pub fn handle_daemon(service: MemoryService, config: &Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.bind_addr());
    crate::web::start_daemon(service, &bind)
}

pub fn handle_ingest(service: &MemoryService, record: ActivityRecord) -> Result<()> {
    let receipt = service.ingest(record)?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

pub fn handle_recall(service: &MemoryService, text: &str, top_k: Option<usize>) -> Result<()> {
    let memories = service.recall(text, top_k)?;
    println!("{}", serde_json::to_string_pretty(&memories)?);
    Ok(())
}

pub fn handle_list(service: &MemoryService, limit: Option<usize>) -> Result<()> {
    let memories = service.list_all(limit)?;
    println!("{}", serde_json::to_string_pretty(&memories)?);
    Ok(())
}

pub fn handle_delete(
    service: &MemoryService,
    ids: Vec<String>,
    all: bool,
    yes: bool,
) -> Result<()> {
    let request = delete_request(ids, all)?;

    if request.delete_all && !yes {
        match inquire::prompt_confirmation("Delete ALL memories? This cannot be undone.") {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }

    match service.delete(request)? {
        DeleteStatus::DeletedAll => println!("all memories deleted"),
        DeleteStatus::Deleted { count } => println!("{count} memories deleted"),
        DeleteStatus::Noop => println!("nothing to delete"),
    }

    Ok(())
}

pub fn handle_enrich(config: &Config, record: ActivityRecord) -> Result<()> {
    let dispatcher = AppFactory::create_dispatcher(config)?;
    println!("{}", dispatcher.enrich(&record));
    Ok(())
}

/// Record for the ingest/enrich commands; timestamp defaults to now (UTC).
pub fn activity_record(
    title: String,
    url: String,
    content: String,
    timestamp: Option<String>,
) -> ActivityRecord {
    ActivityRecord {
        title,
        url,
        content,
        timestamp: timestamp
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

fn delete_request(ids: Vec<String>, all: bool) -> Result<DeleteRequest> {
    if all && !ids.is_empty() {
        bail!("--all cannot be combined with --id");
    }
    if !all && ids.is_empty() {
        bail!("pass --id <ID> at least once, or --all");
    }

    Ok(DeleteRequest {
        ids: (!ids.is_empty()).then_some(ids),
        delete_all: all,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_record_default_timestamp_is_valid() {
        let record = activity_record("t".into(), "https://example.com".into(), "".into(), None);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_delete_request_flags() {
        let req = delete_request(vec!["a".into()], false).unwrap();
        assert_eq!(req.ids, Some(vec!["a".to_string()]));
        assert!(!req.delete_all);

        let req = delete_request(vec![], true).unwrap();
        assert!(req.ids.is_none());
        assert!(req.delete_all);

        assert!(delete_request(vec![], false).is_err());
        assert!(delete_request(vec!["a".into()], true).is_err());
    }
}
