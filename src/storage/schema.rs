//! Table definitions
//!
//! Every statement is idempotent so the schema can be applied on each start.

pub const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT,
        last_name TEXT,
        registration_date TEXT NOT NULL,
        last_activity TEXT,
        requests_count INTEGER NOT NULL DEFAULT 0,
        is_banned INTEGER NOT NULL DEFAULT 0,
        rating REAL,
        solved_issues INTEGER NOT NULL DEFAULT 0,
        avg_response_time REAL
    )",
    "CREATE TABLE IF NOT EXISTS tickets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticket_id TEXT NOT NULL UNIQUE,
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        category TEXT NOT NULL,
        priority TEXT NOT NULL,
        problem TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_update TEXT NOT NULL,
        assigned_to INTEGER,
        response_time INTEGER,
        satisfaction_rating INTEGER CHECK (satisfaction_rating BETWEEN 1 AND 5)
    )",
    "CREATE INDEX IF NOT EXISTS idx_tickets_user ON tickets(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_status_update ON tickets(status, last_update)",
    "CREATE TABLE IF NOT EXISTS ticket_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticket_id TEXT NOT NULL REFERENCES tickets(ticket_id),
        sender_id INTEGER NOT NULL,
        message TEXT NOT NULL,
        sent_at TEXT NOT NULL,
        is_internal INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages(ticket_id)",
    "CREATE TABLE IF NOT EXISTS feedback (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticket_id TEXT NOT NULL UNIQUE REFERENCES tickets(ticket_id),
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        comment TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        message TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id)",
];
