use crate::application::repos::RepoError;

/// Classifies a driver error into the repository taxonomy.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => classify_database_message(db.message(), db.constraint()),
        other => RepoError::from_persistence(other),
    }
}

fn classify_database_message(message: &str, constraint: Option<&str>) -> RepoError {
    if message.contains("duplicate key") {
        RepoError::Duplicate {
            constraint: constraint.unwrap_or("unknown").to_string(),
        }
    } else if message.contains("invalid input") || message.contains("violates check constraint")
    {
        RepoError::InvalidInput {
            message: message.to_string(),
        }
    } else if message.contains("violates") {
        RepoError::Integrity {
            message: message.to_string(),
        }
    } else if message.contains("canceling statement due to") {
        RepoError::Timeout
    } else {
        RepoError::from_persistence(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
    }

    #[test]
    fn database_messages_are_classified() {
        assert!(matches!(
            classify_database_message(
                "duplicate key value violates unique constraint \"users_email_key\"",
                Some("users_email_key"),
            ),
            RepoError::Duplicate { constraint } if constraint == "users_email_key"
        ));
        assert!(matches!(
            classify_database_message(
                "invalid input value for enum task_status: \"archived\"",
                None
            ),
            RepoError::InvalidInput { .. }
        ));
        assert!(matches!(
            classify_database_message("null value violates not-null constraint", None),
            RepoError::Integrity { .. }
        ));
        assert!(matches!(
            classify_database_message("canceling statement due to statement timeout", None),
            RepoError::Timeout
        ));
    }
}
