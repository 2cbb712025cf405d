//! Static seed data for the `countries` table, compiled into the binary.
//! A small illustrative subset; `nicename` and `iso3` are matched against
//! the last whitespace-separated token of a place's formatted address.

pub struct CountrySeed {
    pub nicename: &'static str,
    pub iso3: &'static str,
}

pub const COUNTRIES: &[CountrySeed] = &[
    CountrySeed { nicename: "United States", iso3: "USA" },
    CountrySeed { nicename: "United Kingdom", iso3: "GBR" },
    CountrySeed { nicename: "France", iso3: "FRA" },
    CountrySeed { nicename: "Germany", iso3: "DEU" },
    CountrySeed { nicename: "Spain", iso3: "ESP" },
    CountrySeed { nicename: "Italy", iso3: "ITA" },
    CountrySeed { nicename: "Norway", iso3: "NOR" },
    CountrySeed { nicename: "Sweden", iso3: "SWE" },
    CountrySeed { nicename: "Japan", iso3: "JPN" },
    CountrySeed { nicename: "Canada", iso3: "CAN" },
    CountrySeed { nicename: "Australia", iso3: "AUS" },
    CountrySeed { nicename: "Belgium", iso3: "BEL" },
    CountrySeed { nicename: "Netherlands", iso3: "NLD" },
    CountrySeed { nicename: "Switzerland", iso3: "CHE" },
    CountrySeed { nicename: "Portugal", iso3: "PRT" },
];

pub async fn seed(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM countries")
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for c in COUNTRIES {
        sqlx::query("INSERT INTO countries (nicename, iso3) VALUES (?, ?)")
            .bind(c.nicename)
            .bind(c.iso3)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::info!("Seeded {} countries", COUNTRIES.len());
    Ok(())
}
