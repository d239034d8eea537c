use ::rusqlite::Connection;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

const CREATE_TABLES: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER,
    tags TEXT,
    data TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE articles (
    id INTEGER PRIMARY KEY,
    uid INTEGER NOT NULL REFERENCES users(id),
    title TEXT NOT NULL,
    rating INTEGER
);
CREATE TABLE comments (
    id INTEGER PRIMARY KEY,
    aid INTEGER NOT NULL REFERENCES articles(id),
    uid INTEGER NOT NULL REFERENCES users(id),
    text TEXT NOT NULL
);
"#;

/// Three users, three articles and three comments:
///
/// - ann (1, 30, active) wrote "Rust" (10) and "SQL" (11)
/// - bob (2, 17, inactive) wrote nothing
/// - cid (3, 45, active) wrote "Go" (12)
pub fn setup_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    conn.execute_batch(CREATE_TABLES)
        .expect("Failed to create tables");
    conn.execute_batch(
        r#"
        INSERT INTO users (id, name, age, tags, data, active) VALUES
            (1, 'ann', 30, '["a","b"]', '{"x":1}', 1),
            (2, 'bob', 17, '[]', NULL, 0),
            (3, 'cid', 45, '["b"]', '{"x":2}', 1);
        INSERT INTO articles (id, uid, title, rating) VALUES
            (10, 1, 'Rust', 5),
            (11, 1, 'SQL', 3),
            (12, 3, 'Go', 4);
        INSERT INTO comments (id, aid, uid, text) VALUES
            (100, 10, 2, 'nice'),
            (101, 10, 3, 'ok'),
            (102, 12, 1, 'meh');
        "#,
    )
    .expect("Failed to insert fixtures");
    conn
}

/// An empty database filled with `rows` random users, each with up to three articles
pub fn seeded_db(rows: usize, rng_seed: u64) -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    conn.execute_batch(CREATE_TABLES)
        .expect("Failed to create tables");

    let mut rng = StdRng::seed_from_u64(rng_seed);
    let names = ["John", "Alice", "Thomas", "Appa", "Sarah", "Mike", "Laura", "Ethan"];
    let titles = ["Intro", "Deep dive", "Notes", "Retrospective"];
    let mut article_id = 1;
    for id in 1..=rows {
        let name = names.choose(&mut rng).expect("names is not empty");
        let age: i64 = rng.random_range(10..=80);
        let active = rng.random_bool(0.5);
        conn.execute(
            "INSERT INTO users (id, name, age, tags, active) VALUES (?1, ?2, ?3, '[]', ?4)",
            ::rusqlite::params![id as i64, name, age, active],
        )
        .expect("Failed to insert into users");

        for _ in 0..rng.random_range(0..=3) {
            let title = titles.choose(&mut rng).expect("titles is not empty");
            let rating: i64 = rng.random_range(1..=5);
            conn.execute(
                "INSERT INTO articles (id, uid, title, rating) VALUES (?1, ?2, ?3, ?4)",
                ::rusqlite::params![article_id, id as i64, title, rating],
            )
            .expect("Failed to insert into articles");
            article_id += 1;
        }
    }
    conn
}
