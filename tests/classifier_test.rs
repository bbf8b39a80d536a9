//! Black-box fuzzing of the read-only classifier.
//!
//! Random, malicious and edge-case statements are pushed through every
//! dialect. Nothing may panic, nothing that writes may be accepted, and every
//! accepted statement must come back carrying a row limit.

use db_query_gateway::models::DatabaseType;
use db_query_gateway::sql::SqlClassifier;
use db_query_gateway::sql::classifier::messages;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;

const CAP: u32 = 1000;

fn classifiers() -> Vec<SqlClassifier> {
    vec![
        SqlClassifier::new(),
        SqlClassifier::for_database(DatabaseType::PostgreSQL),
        SqlClassifier::for_database(DatabaseType::MySQL),
        SqlClassifier::for_database(DatabaseType::SQLite),
    ]
}

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        ";".to_string(),
        ";;;".to_string(),
        "--".to_string(),
        "/* */".to_string(),
        "🚀".repeat(100),
        "'OR 1=1--".to_string(),
        "'; DROP TABLE users--".to_string(),
        "1' UNION SELECT NULL, NULL--".to_string(),
        "SELECT 'unterminated".to_string(),
        "a".repeat(10000),
        random_string(100),
        "\u{0000}\u{FFFF}".to_string(),
        "\x00\x01\x02".to_string(),
    ]
}

/// Statements that write, lock or change schema. All must be rejected.
fn write_statements() -> Vec<&'static str> {
    vec![
        "INSERT INTO users (id) VALUES (1)",
        "UPDATE users SET email = 'x'",
        "DELETE FROM users",
        "DROP TABLE users",
        "CREATE TABLE t (id INT)",
        "ALTER TABLE users ADD COLUMN age INT",
        "TRUNCATE TABLE users",
        "SELECT * INTO backup FROM users",
        "SELECT * FROM users FOR UPDATE",
        "SELECT 1; DELETE FROM users",
        "SELECT 1; SELECT 2",
        "GRANT SELECT ON users TO public",
    ]
}

#[test]
fn fuzz_edge_cases_never_panic_or_accept() {
    for classifier in classifiers() {
        for input in edge_case_strings() {
            let result = classifier.classify_and_limit(&input, CAP);
            assert!(!result.ok, "accepted {:?}", input);
            assert!(result.rewritten_sql.is_none());
            assert!(!result.message.is_empty());
        }
    }
}

#[test]
fn fuzz_empty_input_message() {
    for classifier in classifiers() {
        for input in ["", "   ", ";"] {
            let result = classifier.classify_and_limit(input, CAP);
            assert_eq!(result.message, messages::EMPTY, "input {:?}", input);
        }
    }
}

#[test]
fn fuzz_writes_with_random_noise_rejected() {
    let mut rng = rand::thread_rng();
    let writes = write_statements();
    let decorations = ["", " ", "\n", "  -- trailing comment", " /* c */ "];

    for _ in 0..200 {
        let statement = writes.choose(&mut rng).unwrap();
        let prefix = decorations.choose(&mut rng).unwrap();
        let suffix = decorations.choose(&mut rng).unwrap();
        let sql = if rng.gen_bool(0.5) {
            format!("{prefix}{statement}{suffix}")
        } else {
            format!("{prefix}{}{suffix}", statement.to_lowercase())
        };

        for classifier in classifiers() {
            let result = classifier.classify_and_limit(&sql, CAP);
            assert!(!result.ok, "accepted {:?}", sql);
        }
    }
}

#[test]
fn fuzz_random_tails_after_write_keyword_rejected() {
    for keyword in ["INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER"] {
        for len in [0, 1, 10, 100] {
            let sql = format!("{} {}", keyword, random_string(len));
            for classifier in classifiers() {
                assert!(!classifier.classify_and_limit(&sql, CAP).ok, "accepted {:?}", sql);
            }
        }
    }
}

#[test]
fn fuzz_accepted_statements_always_limited() {
    let mut rng = rand::thread_rng();
    let tables = ["users", "orders", "t1"];
    let tails = ["", " WHERE id > 3", " ORDER BY id", " GROUP BY id", " OFFSET 4"];

    for _ in 0..200 {
        let cap = rng.gen_range(1..=100_000u32);
        let table = tables.choose(&mut rng).unwrap();
        let tail = tails.choose(&mut rng).unwrap();
        let sql = format!("SELECT id FROM {table}{tail}");

        for classifier in classifiers() {
            let result = classifier.classify_and_limit(&sql, cap);
            assert!(result.ok, "{sql}: {}", result.message);
            let rewritten = result.rewritten_sql.unwrap();
            assert!(
                rewritten.contains(&format!("LIMIT {cap}")),
                "{sql} -> {rewritten}"
            );
            assert!(classifier.has_row_limit(&rewritten));

            // The rewritten statement is stable under a second pass
            let again = classifier.classify_and_limit(&rewritten, cap);
            assert_eq!(again.rewritten_sql.as_deref(), Some(rewritten.as_str()));
        }
    }
}

#[test]
fn fuzz_explicit_limits_untouched() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let limit = rng.gen_range(0..=10_000u32);
        let sql = format!("SELECT * FROM users LIMIT {limit}");
        for classifier in classifiers() {
            let result = classifier.classify_and_limit(&sql, CAP);
            assert_eq!(result.rewritten_sql.as_deref(), Some(sql.as_str()));
        }
    }
}
