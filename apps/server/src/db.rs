use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(pool)
        .await?;

    // Create migrations tracking table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    // Run 001_init only if not already applied
    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '001_init'")
            .fetch_one(pool)
            .await?;

    if !applied {
        let migration_sql = include_str!("../migrations/001_init.sql");
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(pool).await.ok();
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ('001_init')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 001_init");
    }

    // 002: Default salon week — Mon–Sat 09:00–18:00, closed Sunday
    let hours_applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '002_salon_hours'")
            .fetch_one(pool)
            .await?;

    if !hours_applied {
        sqlx::query(
            "INSERT INTO salon_hours (weekday, is_open, open_time, close_time) VALUES
                (0, 1, '09:00', '18:00'),
                (1, 1, '09:00', '18:00'),
                (2, 1, '09:00', '18:00'),
                (3, 1, '09:00', '18:00'),
                (4, 1, '09:00', '18:00'),
                (5, 1, '09:00', '18:00'),
                (6, 0, '00:00', '00:00')",
        )
        .execute(pool)
        .await
        .ok();

        sqlx::query("INSERT INTO _migrations (name) VALUES ('002_salon_hours')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 002_salon_hours");
    }

    // 003: Seed catalog and stylist roster
    let catalog_applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '003_catalog'")
            .fetch_one(pool)
            .await?;

    if !catalog_applied {
        sqlx::query(
            "INSERT INTO services (name, description, price, duration_min, sort_order, is_active) VALUES
                ('Women''s haircut', 'Cut, wash and finish', 6500, 60, 1, 1),
                ('Men''s haircut', 'Cut and style', 3500, 30, 2, 1),
                ('Single-process colour', 'Full-head colour, one shade', 9000, 120, 3, 1),
                ('Blow-dry & style', 'Wash and blow-dry', 4000, 30, 4, 1),
                ('Balayage', 'Freehand highlights with toner', 14000, 180, 5, 1)",
        )
        .execute(pool)
        .await
        .ok();

        sqlx::query("INSERT INTO stylists (name, is_active) VALUES ('Mara', 1), ('Iris', 1)")
            .execute(pool)
            .await
            .ok();

        // Mara: Tue–Sat 10:00–18:00. Iris: Mon–Fri 09:00–17:00.
        // Missing weekday rows read as closed.
        sqlx::query(
            "INSERT INTO stylist_hours (stylist_id, weekday, is_open, open_time, close_time) VALUES
                (1, 1, 1, '10:00', '18:00'),
                (1, 2, 1, '10:00', '18:00'),
                (1, 3, 1, '10:00', '18:00'),
                (1, 4, 1, '10:00', '18:00'),
                (1, 5, 1, '10:00', '18:00'),
                (2, 0, 1, '09:00', '17:00'),
                (2, 1, 1, '09:00', '17:00'),
                (2, 2, 1, '09:00', '17:00'),
                (2, 3, 1, '09:00', '17:00'),
                (2, 4, 1, '09:00', '17:00')",
        )
        .execute(pool)
        .await
        .ok();

        sqlx::query(
            "INSERT INTO stylist_specialties (stylist_id, service_id) VALUES
                (1, 1), (1, 2), (1, 4),
                (2, 1), (2, 3), (2, 5)",
        )
        .execute(pool)
        .await
        .ok();

        sqlx::query("INSERT INTO _migrations (name) VALUES ('003_catalog')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 003_catalog");
    }

    // 004: Performance indexes for the hot availability/booking queries
    let indexes_applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '004_indexes'")
            .fetch_one(pool)
            .await?;

    if !indexes_applied {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_appointments_date_status ON appointments(date, status)",
        )
        .execute(pool)
        .await
        .ok();
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_appointments_stylist ON appointments(stylist_id)",
        )
        .execute(pool)
        .await
        .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_blocks_date ON slot_blocks(date)")
            .execute(pool)
            .await
            .ok();
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_appointment_services ON appointment_services(appointment_id)",
        )
        .execute(pool)
        .await
        .ok();

        sqlx::query("INSERT INTO _migrations (name) VALUES ('004_indexes')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 004_indexes");
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}
