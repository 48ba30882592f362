//! Schema bootstrap for the catalog and user databases.
//!
//! The store spans two attached databases, so the schema is applied as
//! idempotent statement batches at open time rather than through a
//! single-database migrator.

/// Statements applied to the main (catalog) database.
pub(crate) const METADATA_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS series (
        id INTEGER PRIMARY KEY,
        imdb_id TEXT,
        name TEXT,
        banner TEXT,
        poster TEXT,
        tvdb_id INTEGER,
        tvrage_id INTEGER,
        youtube_trailer TEXT,
        updated_at INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS series_on_updated_at ON series (updated_at)",
    "CREATE INDEX IF NOT EXISTS series_on_tvdb_id ON series (tvdb_id)",
    "CREATE TABLE IF NOT EXISTS category (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS category_name ON category (name)",
    "CREATE TABLE IF NOT EXISTS torrent_entry_group (
        id INTEGER PRIMARY KEY,
        category_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        series_id INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS torrent_entry_group_on_updated_at
        ON torrent_entry_group (updated_at)",
    "CREATE INDEX IF NOT EXISTS torrent_entry_group_on_series_id
        ON torrent_entry_group (series_id)",
    "CREATE TABLE IF NOT EXISTS codec (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE UNIQUE INDEX IF NOT EXISTS codec_name ON codec (name)",
    "CREATE TABLE IF NOT EXISTS container (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE UNIQUE INDEX IF NOT EXISTS container_name ON container (name)",
    "CREATE TABLE IF NOT EXISTS origin (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE UNIQUE INDEX IF NOT EXISTS origin_name ON origin (name)",
    "CREATE TABLE IF NOT EXISTS resolution (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE UNIQUE INDEX IF NOT EXISTS resolution_name ON resolution (name)",
    "CREATE TABLE IF NOT EXISTS source (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE UNIQUE INDEX IF NOT EXISTS source_name ON source (name)",
    "CREATE TABLE IF NOT EXISTS torrent_entry (
        id INTEGER PRIMARY KEY,
        codec_id INTEGER NOT NULL,
        container_id INTEGER NOT NULL,
        group_id INTEGER NOT NULL,
        info_hash TEXT,
        leechers INTEGER NOT NULL,
        origin_id INTEGER NOT NULL,
        release_name TEXT NOT NULL,
        resolution_id INTEGER NOT NULL,
        seeders INTEGER NOT NULL,
        size INTEGER NOT NULL,
        snatched INTEGER NOT NULL,
        source_id INTEGER NOT NULL,
        time INTEGER NOT NULL,
        raw_torrent_cached INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS torrent_entry_updated_at ON torrent_entry (updated_at)",
    "CREATE INDEX IF NOT EXISTS torrent_entry_on_group_id ON torrent_entry (group_id)",
    "CREATE INDEX IF NOT EXISTS torrent_entry_on_info_hash ON torrent_entry (info_hash)",
    "CREATE TABLE IF NOT EXISTS file_info (
        id INTEGER NOT NULL,
        file_index INTEGER NOT NULL,
        path BLOB NOT NULL,
        start INTEGER NOT NULL,
        stop INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS file_info_id_index ON file_info (id, file_index)",
    "CREATE INDEX IF NOT EXISTS file_info_updated_at ON file_info (updated_at)",
];

/// Statements applied to the attached user database.
pub(crate) const USER_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user.global (
        name TEXT NOT NULL,
        value TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS user.global_name ON global (name)",
    "CREATE TABLE IF NOT EXISTS user.user_info (
        id INTEGER PRIMARY KEY,
        bonus INTEGER NOT NULL,
        class_name TEXT NOT NULL,
        class_level INTEGER NOT NULL,
        download INTEGER NOT NULL,
        email TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        hnr INTEGER NOT NULL,
        invites INTEGER NOT NULL,
        join_date INTEGER NOT NULL,
        lumens INTEGER NOT NULL,
        paranoia INTEGER NOT NULL,
        snatches INTEGER NOT NULL,
        title TEXT NOT NULL,
        upload INTEGER NOT NULL,
        uploads_snatched INTEGER NOT NULL,
        username TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user.snatch (
        id INTEGER PRIMARY KEY,
        downloaded INTEGER NOT NULL,
        uploaded INTEGER NOT NULL,
        seed_time INTEGER NOT NULL,
        seeding INTEGER NOT NULL,
        snatch_time INTEGER NOT NULL,
        hnr_removed INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS user.snatch_updated_at ON snatch (updated_at)",
];
