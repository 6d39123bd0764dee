use std::collections::HashSet;

use axum::{Json, body::Bytes, extract::State};
use chrono::Utc;
use tracing::{info, warn};

use checkin_db::models::{Inserted, NewUser};
use checkin_types::api::{ImportRowError, ImportSummary};
use checkin_types::models::Role;

use crate::auth::{
    AppState, hash_password, validate_name, validate_password, validate_username,
};
use crate::csv;
use crate::error::ApiError;
use crate::run_blocking;

/// 1 MiB upload limit for roster files
pub const MAX_IMPORT_SIZE: usize = 1024 * 1024;

/// A data row that passed field checks.
#[derive(Debug, PartialEq)]
pub struct RosterRow {
    pub line: usize,
    pub username: String,
    pub name: String,
    pub password: Option<String>,
    pub student_id: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct Roster {
    pub rows: Vec<RosterRow>,
    pub errors: Vec<ImportRowError>,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    username: usize,
    name: usize,
    password: Option<usize>,
    student_id: Option<usize>,
}

/// POST /api/admin/students/import — CSV body, header row required.
///
/// Rows are inserted one by one: a duplicate username is skipped, any other
/// bad row is reported, and neither stops the rest of the file.
pub async fn import_students(
    State(state): State<AppState>,
    bytes: Bytes,
) -> Result<Json<ImportSummary>, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::bad_request("CSV file is empty"));
    }
    if bytes.len() > MAX_IMPORT_SIZE {
        return Err(ApiError::PayloadTooLarge {
            limit: MAX_IMPORT_SIZE,
        });
    }

    let text =
        String::from_utf8(bytes.to_vec()).map_err(|_| ApiError::bad_request("CSV file must be UTF-8"))?;
    let roster = parse_roster(&text)?;

    let summary = run_blocking(&state, move |state| {
        let Roster { rows, errors } = roster;
        let mut summary = ImportSummary {
            errors,
            ..Default::default()
        };

        let usernames: Vec<String> = rows.iter().map(|r| r.username.clone()).collect();
        let taken = state.db.existing_usernames(&usernames)?;

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for row in rows {
            if taken.contains(&row.username) || !seen.insert(row.username.clone()) {
                summary.skip_count += 1;
                continue;
            }
            let password = row.password.as_deref().unwrap_or(&state.import_password);
            match hash_password(password) {
                Ok(hash) => pending.push((row, hash)),
                Err(e) => {
                    warn!(line = row.line, "Import row failed: {:#}", e);
                    summary.errors.push(ImportRowError {
                        line: row.line,
                        message: "Could not process password".into(),
                    });
                }
            }
        }

        let users: Vec<NewUser<'_>> = pending
            .iter()
            .map(|(row, hash)| NewUser {
                username: &row.username,
                password_hash: hash,
                role: Role::Student,
                name: &row.name,
                student_id: row.student_id.as_deref(),
            })
            .collect();
        let results = state.db.create_users(&users, Utc::now())?;

        for ((row, _), result) in pending.iter().zip(results) {
            match result {
                Inserted::Created(_) => summary.success_count += 1,
                Inserted::Duplicate => summary.errors.push(ImportRowError {
                    line: row.line,
                    message: "Username or student ID already exists".into(),
                }),
            }
        }

        summary.errors.sort_by_key(|e| e.line);
        Ok(summary)
    })
    .await?;

    info!(
        success = summary.success_count,
        skipped = summary.skip_count,
        errors = summary.errors.len(),
        "Student import finished"
    );
    Ok(Json(summary))
}

/// Locates columns by header name and validates each data row.
pub fn parse_roster(text: &str) -> Result<Roster, ApiError> {
    let mut rows = csv::parse(text)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
        .into_iter();

    let header = rows
        .next()
        .ok_or_else(|| ApiError::bad_request("CSV file has no header row"))?;
    let columns = locate_columns(&header.fields)?;

    let mut roster = Roster::default();
    for row in rows {
        let cell = |idx: usize| {
            row.fields
                .get(idx)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let (Some(username), Some(name)) = (cell(columns.username), cell(columns.name)) else {
            roster.errors.push(ImportRowError {
                line: row.line,
                message: "Missing username or name".into(),
            });
            continue;
        };

        let password = columns.password.and_then(cell);
        let checked = validate_username(&username)
            .and_then(|()| validate_name(&name))
            .and_then(|()| password.as_deref().map_or(Ok(()), validate_password));
        if let Err(e) = checked {
            roster.errors.push(ImportRowError {
                line: row.line,
                message: e.to_string(),
            });
            continue;
        }

        roster.rows.push(RosterRow {
            line: row.line,
            username,
            name,
            password,
            student_id: columns.student_id.and_then(cell),
        });
    }

    Ok(roster)
}

fn locate_columns(header: &[String]) -> Result<Columns, ApiError> {
    let find = |names: &[&str]| {
        header.iter().position(|h| {
            let h = h.trim().to_ascii_lowercase();
            names.contains(&h.as_str())
        })
    };

    let username = find(&["username", "user", "login"]);
    let name = find(&["name", "full_name", "display_name"]);
    let (Some(username), Some(name)) = (username, name) else {
        return Err(ApiError::bad_request(
            "CSV header must contain 'username' and 'name' columns",
        ));
    };

    Ok(Columns {
        username,
        name,
        password: find(&["password", "initial_password"]),
        student_id: find(&["student_id", "student_no"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_found_by_name_in_any_order() {
        let roster = parse_roster("Password,Name,Username\nsecret1,Zhang San,zhangsan\n").unwrap();
        assert_eq!(
            roster.rows,
            vec![RosterRow {
                line: 2,
                username: "zhangsan".into(),
                name: "Zhang San".into(),
                password: Some("secret1".into()),
                student_id: None,
            }]
        );
    }

    #[test]
    fn missing_fields_are_row_errors() {
        let roster = parse_roster("username,name\nzhangsan,\n,Li Si\nwangwu,Wang Wu\n").unwrap();
        assert_eq!(roster.rows.len(), 1);
        assert_eq!(
            roster.errors.iter().map(|e| e.line).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn rows_follow_registration_rules() {
        let text = "username,name,password\n\
                    zhangsan,Zhang San,secret1\n\
                    li si,Li Si,secret1\n\
                    wangwu,Wang Wu,123\n\
                    zl,Zhao Liu,\n\
                    zhaoliu,Zhao Liu,\n";
        let roster = parse_roster(text).unwrap();
        assert_eq!(
            roster.rows.iter().map(|r| r.username.as_str()).collect::<Vec<_>>(),
            vec!["zhangsan", "zhaoliu"]
        );
        let errors: Vec<(usize, &str)> = roster
            .errors
            .iter()
            .map(|e| (e.line, e.message.as_str()))
            .collect();
        assert_eq!(
            errors,
            vec![
                (3, "Username may only contain letters, digits, '_', '.' and '-'"),
                (4, "Password must be at least 6 characters"),
                (5, "Username must be 3-32 characters"),
            ]
        );
    }

    #[test]
    fn header_without_required_columns_is_rejected() {
        let err = parse_roster("email,password\na@b.c,x\n").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn export_columns_are_ignored() {
        let text = "\u{feff}username,name,student_id,status,checkin_time\r\nzhangsan,Zhang San,S01,present,2026-03-02T09:05:00Z\r\n";
        let roster = parse_roster(text).unwrap();
        assert_eq!(roster.rows[0].student_id.as_deref(), Some("S01"));
        assert_eq!(roster.rows[0].password, None);
    }

    #[test]
    fn empty_file_has_no_header() {
        assert!(parse_roster("").is_err());
    }
}
