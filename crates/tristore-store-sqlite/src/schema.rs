//! SQL schemas for the three SQLite stores.
//!
//! Each is executed once when its connection opens. Future migrations will be
//! gated on `PRAGMA user_version`.

/// The authoritative store. Foreign keys carry the delete cascades.
pub const RELATIONAL: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS root_categories (
    id          TEXT PRIMARY KEY,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    code             TEXT NOT NULL,            -- CAT-{root}-{level}
    name             TEXT NOT NULL,
    root_category_id TEXT NOT NULL REFERENCES root_categories(id) ON DELETE CASCADE,
    level            INTEGER NOT NULL,
    description      TEXT,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS root_subjects (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    parent_id   INTEGER REFERENCES root_subjects(id) ON DELETE CASCADE,
    level       INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subjects (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    code            TEXT NOT NULL UNIQUE,      -- SUB-{root}-{seq:03}
    name            TEXT NOT NULL,
    root_subject_id INTEGER NOT NULL REFERENCES root_subjects(id) ON DELETE CASCADE,
    synonyms        TEXT NOT NULL DEFAULT '[]',
    categories      TEXT NOT NULL DEFAULT '[]',
    description     TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    code                 TEXT NOT NULL UNIQUE,
    name                 TEXT NOT NULL,
    description          TEXT,
    inverse_relationship TEXT,
    semantic_type        TEXT,
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS diagrams (
    id          TEXT PRIMARY KEY,
    category_id INTEGER REFERENCES categories(id) ON DELETE CASCADE,
    image_path  TEXT,
    processed   INTEGER NOT NULL DEFAULT 0,
    metadata    TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS triples (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    code             TEXT NOT NULL,
    subject_id       INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    relationship_id  INTEGER NOT NULL REFERENCES relationships(id) ON DELETE CASCADE,
    object_id        INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    diagram_id       TEXT REFERENCES diagrams(id) ON DELETE CASCADE,
    confidence_score REAL CHECK (confidence_score IS NULL OR confidence_score BETWEEN 0.0 AND 1.0),
    context          TEXT,
    created_at       TEXT NOT NULL,
    UNIQUE (subject_id, relationship_id, object_id)
);

-- Last subject code issued per prefix, so deleted codes are never reissued.
CREATE TABLE IF NOT EXISTS code_sequences (
    prefix    TEXT PRIMARY KEY,
    last_code TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS categories_root_idx   ON categories(root_category_id);
CREATE INDEX IF NOT EXISTS root_subjects_par_idx ON root_subjects(parent_id);
CREATE INDEX IF NOT EXISTS subjects_root_idx     ON subjects(root_subject_id);
CREATE INDEX IF NOT EXISTS diagrams_category_idx ON diagrams(category_id);
CREATE INDEX IF NOT EXISTS triples_object_idx    ON triples(object_id);
CREATE INDEX IF NOT EXISTS triples_rel_idx       ON triples(relationship_id);
CREATE INDEX IF NOT EXISTS triples_diagram_idx   ON triples(diagram_id);

PRAGMA user_version = 1;
";

/// A labeled property graph. Per-label and per-edge-type indexes are added
/// on demand by the statement builder.
pub const GRAPH: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS nodes (
    node_id INTEGER PRIMARY KEY AUTOINCREMENT,
    label   TEXT NOT NULL,
    name    TEXT NOT NULL,
    props   TEXT NOT NULL DEFAULT '{}',
    UNIQUE (label, name)
);

CREATE TABLE IF NOT EXISTS edges (
    edge_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    edge_type TEXT NOT NULL,
    src       INTEGER NOT NULL REFERENCES nodes(node_id) ON DELETE CASCADE,
    dst       INTEGER NOT NULL REFERENCES nodes(node_id) ON DELETE CASCADE,
    props     TEXT NOT NULL DEFAULT '{}',
    UNIQUE (edge_type, src, dst)
);

CREATE INDEX IF NOT EXISTS edges_dst_idx ON edges(dst);

PRAGMA user_version = 1;
";

/// Schemaless documents keyed by collection and sync id.
pub const DOCUMENT: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    sync_id    TEXT NOT NULL,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, sync_id)
);

-- Append-only: no UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS query_logs (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    log_id      TEXT NOT NULL UNIQUE,
    query_type  TEXT NOT NULL,   -- 'triple' | 'inference'
    input       TEXT NOT NULL,
    triples     TEXT NOT NULL DEFAULT '[]',
    recorded_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";
