//! Sessions repository.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{Result, StorageError};
use crate::models::{NewSession, Session, SessionFilter, SessionTimings};

const SELECT_COLUMNS: &str = "SELECT id, method, scheme, host, port, uri, version,
        request_headers, response_headers, status, reason,
        request_body_path, response_body_path,
        dns_start, connect_start, send_start, send_end, receive_start, receive_end,
        request_bytes, response_bytes, remote_address, client_identifier, created_at
     FROM sessions";

/// Repository for captured sessions.
pub struct SessionsRepo;

impl SessionsRepo {
    /// Insert a new session.
    pub fn insert(conn: &Connection, session: &NewSession) -> Result<i64> {
        let timings = &session.timings;

        conn.execute(
            "INSERT INTO sessions (
                method, scheme, host, port, uri, version,
                request_headers, response_headers, status, reason,
                request_body_path, response_body_path,
                dns_start, connect_start, send_start, send_end, receive_start, receive_end,
                request_bytes, response_bytes, remote_address, client_identifier
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                session.method,
                session.scheme,
                session.host,
                session.port,
                session.uri,
                session.version,
                session.request_headers,
                session.response_headers,
                session.status,
                session.reason,
                path_to_text(&session.request_body_path),
                path_to_text(&session.response_body_path),
                timings.dns_start.map(|t| t.to_rfc3339()),
                timings.connect_start.map(|t| t.to_rfc3339()),
                timings.send_start.map(|t| t.to_rfc3339()),
                timings.send_end.map(|t| t.to_rfc3339()),
                timings.receive_start.map(|t| t.to_rfc3339()),
                timings.receive_end.map(|t| t.to_rfc3339()),
                session.request_bytes,
                session.response_bytes,
                session.remote_address,
                session.client_identifier,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Record where a session's bodies were stored.
    pub fn set_body_paths(
        conn: &Connection,
        id: i64,
        request: Option<&PathBuf>,
        response: Option<&PathBuf>,
    ) -> Result<()> {
        let updated = conn.execute(
            "UPDATE sessions SET request_body_path = ?1, response_body_path = ?2 WHERE id = ?3",
            params![
                request.map(|p| p.to_string_lossy().into_owned()),
                response.map(|p| p.to_string_lossy().into_owned()),
                id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!("Session with id {}", id)));
        }

        Ok(())
    }

    /// Get a session by ID.
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Session>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_COLUMNS))?;
        let session = stmt.query_row([id], map_session).ok();
        Ok(session)
    }

    /// Get several sessions, in the order the ids were given.
    ///
    /// Ids with no row are skipped.
    pub fn get_many(conn: &Connection, ids: &[i64]) -> Result<Vec<Session>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_COLUMNS))?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(session) = stmt.query_row([id], map_session) {
                sessions.push(session);
            }
        }

        Ok(sessions)
    }

    /// List sessions, newest first.
    pub fn list(conn: &Connection, filter: &SessionFilter) -> Result<Vec<Session>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE (?1 IS NULL OR host LIKE '%' || ?1 || '%')
               AND (?2 IS NULL OR UPPER(method) = UPPER(?2))
               AND (?3 IS NULL OR status = ?3)
             ORDER BY id DESC LIMIT ?4 OFFSET ?5",
            SELECT_COLUMNS
        ))?;

        let sessions = stmt
            .query_map(
                params![
                    filter.host,
                    filter.method,
                    filter.status,
                    filter.limit,
                    filter.offset
                ],
                map_session,
            )?
            .filter_map(|r| r.ok())
            .collect();

        Ok(sessions)
    }

    /// Delete a session row.
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;

        if deleted == 0 {
            return Err(StorageError::NotFound(format!("Session with id {}", id)));
        }

        Ok(())
    }

    /// Count total sessions.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        method: row.get(1)?,
        scheme: row.get(2)?,
        host: row.get(3)?,
        port: row.get(4)?,
        uri: row.get(5)?,
        version: row.get(6)?,
        request_headers: row.get(7)?,
        response_headers: row.get(8)?,
        status: row.get(9)?,
        reason: row.get(10)?,
        request_body_path: row.get::<_, Option<String>>(11)?.map(PathBuf::from),
        response_body_path: row.get::<_, Option<String>>(12)?.map(PathBuf::from),
        timings: SessionTimings {
            dns_start: parse_optional(row.get(13)?),
            connect_start: parse_optional(row.get(14)?),
            send_start: parse_optional(row.get(15)?),
            send_end: parse_optional(row.get(16)?),
            receive_start: parse_optional(row.get(17)?),
            receive_end: parse_optional(row.get(18)?),
        },
        request_bytes: row.get(19)?,
        response_bytes: row.get(20)?,
        remote_address: row.get(21)?,
        client_identifier: row.get(22)?,
        created_at: parse_datetime(&row.get::<_, String>(23)?),
    })
}

fn path_to_text(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

/// Parse an optional timing mark. Unparseable marks count as missing.
fn parse_optional(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a datetime from SQLite format.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use chrono::TimeZone;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn new_session(host: &str, method: &str, status: u16) -> NewSession {
        NewSession {
            method: method.to_string(),
            scheme: "https".to_string(),
            host: host.to_string(),
            uri: "/v1/items?page=2".to_string(),
            version: "HTTP/1.1".to_string(),
            request_headers: "Host: example.com\r\nAccept: */*\r\n".to_string(),
            response_headers: "Content-Type: application/json\r\n".to_string(),
            status: Some(status),
            reason: Some("OK".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = setup_db();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let mut session = new_session("example.com", "GET", 200);
        session.port = Some(8443);
        session.request_body_path = Some(PathBuf::from("/tmp/1.req"));
        session.timings.dns_start = Some(start);
        session.request_bytes = 120;
        session.client_identifier = Some("agent/1.0".to_string());

        let id = SessionsRepo::insert(&conn, &session).unwrap();
        let stored = SessionsRepo::get_by_id(&conn, id).unwrap().unwrap();

        assert_eq!(stored.host, "example.com");
        assert_eq!(stored.port, Some(8443));
        assert_eq!(stored.status, Some(200));
        assert_eq!(stored.request_body_path, Some(PathBuf::from("/tmp/1.req")));
        assert_eq!(stored.response_body_path, None);
        assert_eq!(stored.timings.dns_start, Some(start));
        assert_eq!(stored.timings.receive_end, None);
        assert_eq!(stored.request_bytes, 120);
        assert_eq!(stored.client_identifier.as_deref(), Some("agent/1.0"));
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = setup_db();
        assert!(SessionsRepo::get_by_id(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn test_get_many_keeps_order() {
        let conn = setup_db();
        let a = SessionsRepo::insert(&conn, &new_session("a.com", "GET", 200)).unwrap();
        let b = SessionsRepo::insert(&conn, &new_session("b.com", "GET", 200)).unwrap();
        let c = SessionsRepo::insert(&conn, &new_session("c.com", "GET", 200)).unwrap();

        let sessions = SessionsRepo::get_many(&conn, &[c, 999, a, b]).unwrap();
        let hosts: Vec<_> = sessions.iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, ["c.com", "a.com", "b.com"]);
    }

    #[test]
    fn test_list_filters() {
        let conn = setup_db();
        SessionsRepo::insert(&conn, &new_session("api.example.com", "GET", 200)).unwrap();
        SessionsRepo::insert(&conn, &new_session("cdn.example.com", "POST", 201)).unwrap();
        SessionsRepo::insert(&conn, &new_session("other.org", "get", 404)).unwrap();

        let all = SessionsRepo::list(&conn, &SessionFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].host, "other.org");

        let filter = SessionFilter {
            host: Some("example".to_string()),
            ..Default::default()
        };
        assert_eq!(SessionsRepo::list(&conn, &filter).unwrap().len(), 2);

        let filter = SessionFilter {
            method: Some("GET".to_string()),
            ..Default::default()
        };
        assert_eq!(SessionsRepo::list(&conn, &filter).unwrap().len(), 2);

        let filter = SessionFilter {
            status: Some(404),
            ..Default::default()
        };
        assert_eq!(SessionsRepo::list(&conn, &filter).unwrap().len(), 1);

        let filter = SessionFilter {
            limit: 1,
            offset: 1,
            ..Default::default()
        };
        let page = SessionsRepo::list(&conn, &filter).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].host, "cdn.example.com");
    }

    #[test]
    fn test_set_body_paths() {
        let conn = setup_db();
        let id = SessionsRepo::insert(&conn, &new_session("a.com", "GET", 200)).unwrap();

        let rsp = PathBuf::from("/bodies/1.rsp");
        SessionsRepo::set_body_paths(&conn, id, None, Some(&rsp)).unwrap();

        let stored = SessionsRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(stored.response_body_path, Some(rsp));
        assert!(SessionsRepo::set_body_paths(&conn, 999, None, None).is_err());
    }

    #[test]
    fn test_delete_and_count() {
        let conn = setup_db();
        let id = SessionsRepo::insert(&conn, &new_session("a.com", "GET", 200)).unwrap();
        assert_eq!(SessionsRepo::count(&conn).unwrap(), 1);

        SessionsRepo::delete(&conn, id).unwrap();
        assert_eq!(SessionsRepo::count(&conn).unwrap(), 0);
        assert!(matches!(
            SessionsRepo::delete(&conn, id),
            Err(StorageError::NotFound(_))
        ));
    }
}
