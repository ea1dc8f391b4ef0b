#![allow(dead_code)]

use std::sync::Mutex;

use rusqlite::Connection;
use vdmatch_core::db::build::{catalog_record, insert_records};
use vdmatch_core::db::migrations;
use vdmatch_core::model::CitationQuery;
use vdmatch_search::arbiter::{Arbiter, ArbiterError, ArbiterRequest, ArbiterVerdict};

/// `(identifier, author, title, year, place)`
pub type Row<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);

pub fn catalog(rows: &[Row<'_>]) -> Connection {
    let mut conn = Connection::open_in_memory().expect("open in-memory db");
    migrations::migrate(&mut conn).expect("migrate");
    let records: Vec<_> = rows
        .iter()
        .map(|(id, author, title, year, place)| {
            catalog_record(id, author, title, year, place).expect("valid record")
        })
        .collect();
    insert_records(&mut conn, &records).expect("insert");
    conn
}

pub fn query(author: &str, title: &str, year: &str, place: &str) -> CitationQuery {
    let field = |v: &str| (!v.is_empty()).then(|| v.to_string());
    CitationQuery {
        author: field(author),
        title: field(title),
        year: field(year),
        place: field(place),
    }
}

/// Deterministic arbiter returning a canned reply.
pub struct StubArbiter {
    reply: Result<ArbiterVerdict, String>,
    pub shown: Mutex<Vec<String>>,
}

impl StubArbiter {
    pub fn picking(id: &str) -> Self {
        Self::replying(Ok(ArbiterVerdict::Match(id.to_string())))
    }

    pub fn declining() -> Self {
        Self::replying(Ok(ArbiterVerdict::NoMatch))
    }

    pub fn failing(message: &str) -> Self {
        Self::replying(Err(message.to_string()))
    }

    fn replying(reply: Result<ArbiterVerdict, String>) -> Self {
        Self {
            reply,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().expect("lock").clone()
    }
}

impl Arbiter for StubArbiter {
    fn name(&self) -> &str {
        "stub"
    }

    fn judge(&self, request: &ArbiterRequest<'_>) -> Result<ArbiterVerdict, ArbiterError> {
        self.shown
            .lock()
            .expect("lock")
            .extend(request.candidates.iter().map(|r| r.identifier.clone()));
        self.reply.clone().map_err(ArbiterError::Transport)
    }
}
