//! Read-only analytical queries.
//!
//! Years are extracted from the ISO date text with `strftime`, so every range
//! filter is inclusive on both ends.

use super::models::{RankedName, RankedSong, YearRange};
use super::policy::ProlificScope;
use anyhow::Result;
use rusqlite::{params, Connection, Params};
use std::collections::BTreeSet;

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn ranked_names<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<RankedName>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(RankedName {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn name_set<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let names = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<Result<BTreeSet<String>, _>>()?;
    Ok(names)
}

pub(super) fn most_prolific_individual_artists(
    conn: &Connection,
    n: usize,
    years: YearRange,
    scope: ProlificScope,
) -> Result<Vec<RankedName>> {
    let sql = match scope {
        ProlificScope::SinglesOnly => {
            "SELECT a.name, COUNT(*) AS songs
             FROM songs s JOIN artists a ON a.id = s.artist_id
             WHERE s.album_id IS NULL
               AND CAST(strftime('%Y', s.release_date) AS INTEGER) BETWEEN ?1 AND ?2
             GROUP BY a.id
             ORDER BY songs DESC, a.name ASC
             LIMIT ?3"
        }
        ProlificScope::AllSongs => {
            "SELECT a.name, COUNT(*) AS songs
             FROM songs s
             JOIN artists a ON a.id = s.artist_id
             LEFT JOIN albums al ON al.id = s.album_id
             WHERE CAST(strftime('%Y', COALESCE(s.release_date, al.release_date)) AS INTEGER)
                   BETWEEN ?1 AND ?2
             GROUP BY a.id
             ORDER BY songs DESC, a.name ASC
             LIMIT ?3"
        }
    };
    ranked_names(conn, sql, params![years.start, years.end, limit(n)])
}

pub(super) fn artists_last_single_in_year(conn: &Connection, year: i32) -> Result<BTreeSet<String>> {
    name_set(
        conn,
        "SELECT a.name
         FROM songs s JOIN artists a ON a.id = s.artist_id
         WHERE s.album_id IS NULL AND s.release_date IS NOT NULL
         GROUP BY a.id
         HAVING MAX(CAST(strftime('%Y', s.release_date) AS INTEGER)) = ?1",
        params![year],
    )
}

pub(super) fn top_song_genres(conn: &Connection, n: usize) -> Result<Vec<RankedName>> {
    ranked_names(
        conn,
        "SELECT g.name, COUNT(DISTINCT sg.song_id) AS songs
         FROM song_genres sg JOIN genres g ON g.id = sg.genre_id
         GROUP BY g.id
         ORDER BY songs DESC, g.name ASC
         LIMIT ?1",
        params![limit(n)],
    )
}

pub(super) fn album_and_single_artists(conn: &Connection) -> Result<BTreeSet<String>> {
    name_set(
        conn,
        "SELECT a.name
         FROM artists a
         WHERE EXISTS (SELECT 1 FROM songs s WHERE s.artist_id = a.id AND s.album_id IS NOT NULL)
           AND EXISTS (SELECT 1 FROM songs s WHERE s.artist_id = a.id AND s.album_id IS NULL)",
        [],
    )
}

pub(super) fn most_rated_songs(
    conn: &Connection,
    years: YearRange,
    n: usize,
) -> Result<Vec<RankedSong>> {
    let mut stmt = conn.prepare_cached(
        "SELECT a.name, s.title, COUNT(*) AS ratings
         FROM ratings r
         JOIN songs s ON s.id = r.song_id
         JOIN artists a ON a.id = s.artist_id
         WHERE CAST(strftime('%Y', r.rating_date) AS INTEGER) BETWEEN ?1 AND ?2
         GROUP BY s.id
         ORDER BY ratings DESC, s.title ASC, a.name ASC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![years.start, years.end, limit(n)], |row| {
            Ok(RankedSong {
                artist: row.get(0)?,
                title: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn most_engaged_users(
    conn: &Connection,
    years: YearRange,
    n: usize,
) -> Result<Vec<RankedName>> {
    ranked_names(
        conn,
        "SELECT u.username, COUNT(*) AS ratings
         FROM ratings r JOIN users u ON u.id = r.user_id
         WHERE CAST(strftime('%Y', r.rating_date) AS INTEGER) BETWEEN ?1 AND ?2
         GROUP BY u.id
         ORDER BY ratings DESC, u.username ASC
         LIMIT ?3",
        params![years.start, years.end, limit(n)],
    )
}

#[cfg(test)]
mod tests {
    use crate::music_store::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_tmp_store(policies: StorePolicies) -> (SqliteMusicStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteMusicStore::new(temp_dir.path().join("music.db"), policies).unwrap();
        (store, temp_dir)
    }

    fn ranked(rows: &[(&str, i64)]) -> Vec<RankedName> {
        rows.iter()
            .map(|(name, count)| RankedName {
                name: name.to_string(),
                count: *count,
            })
            .collect()
    }

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn load_catalog(store: &SqliteMusicStore) {
        store
            .load_singles(&[
                SingleRecord::new("S1", &["Pop"], "A1", date(2020, 1, 1)),
                SingleRecord::new("S2", &["Pop", "Rock"], "A1", date(2021, 6, 1)),
                SingleRecord::new("S3", &["Rock"], "B1", date(2020, 3, 1)),
                SingleRecord::new("S4", &["Folk"], "C1", date(2019, 3, 1)),
                SingleRecord::new("S5", &["Folk"], "C1", date(2020, 8, 1)),
            ])
            .unwrap();
        store
            .load_albums(&[AlbumRecord::new(
                "Alb1",
                Some("Jazz"),
                "A2",
                date(2019, 5, 1),
                &["T1", "T2"],
            )])
            .unwrap();
    }

    #[test]
    fn prolific_artists_break_ties_by_name() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        load_catalog(&store);

        assert_eq!(
            store
                .most_prolific_individual_artists(10, YearRange::single(2020))
                .unwrap(),
            ranked(&[("A1", 1), ("B1", 1), ("C1", 1)])
        );
        assert_eq!(
            store
                .most_prolific_individual_artists(2, YearRange::new(2019, 2021))
                .unwrap(),
            ranked(&[("A1", 2), ("C1", 2)])
        );
        assert!(store
            .most_prolific_individual_artists(0, YearRange::new(2019, 2021))
            .unwrap()
            .is_empty());
        assert!(store
            .most_prolific_individual_artists(5, YearRange::new(2021, 2019))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn prolific_scope_decides_whether_album_tracks_count() {
        let (singles_only, _dir1) = create_tmp_store(StorePolicies::default());
        load_catalog(&singles_only);
        assert_eq!(
            singles_only
                .most_prolific_individual_artists(1, YearRange::single(2019))
                .unwrap(),
            ranked(&[("C1", 1)])
        );

        let (all_songs, _dir2) = create_tmp_store(StorePolicies {
            prolific_scope: ProlificScope::AllSongs,
            ..Default::default()
        });
        load_catalog(&all_songs);
        assert_eq!(
            all_songs
                .most_prolific_individual_artists(1, YearRange::single(2019))
                .unwrap(),
            ranked(&[("A2", 2)])
        );
    }

    #[test]
    fn last_single_year_uses_latest_single_only() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        load_catalog(&store);

        assert_eq!(
            store.artists_last_single_in_year(2020).unwrap(),
            names(&["B1", "C1"])
        );
        assert_eq!(store.artists_last_single_in_year(2021).unwrap(), names(&["A1"]));
        // Album tracks are not singles.
        assert!(store.artists_last_single_in_year(2019).unwrap().is_empty());
    }

    #[test]
    fn top_genres_count_singles_and_tracks() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        load_catalog(&store);

        assert_eq!(
            store.top_song_genres(3).unwrap(),
            ranked(&[("Folk", 2), ("Jazz", 2), ("Pop", 2)])
        );
        assert_eq!(store.top_song_genres(10).unwrap().len(), 4);
        assert!(store.top_song_genres(0).unwrap().is_empty());
    }

    #[test]
    fn album_and_single_artists_needs_both() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        load_catalog(&store);
        assert!(store.album_and_single_artists().unwrap().is_empty());

        store
            .load_albums(&[AlbumRecord::new(
                "Alb2",
                None,
                "A1",
                date(2022, 1, 1),
                &["S1", "T9"],
            )])
            .unwrap();
        assert_eq!(store.album_and_single_artists().unwrap(), names(&["A1"]));
    }

    #[test]
    fn rating_rankings_filter_by_rating_year() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        load_catalog(&store);
        store
            .load_users(&["ana".to_string(), "bob".to_string(), "cy".to_string()])
            .unwrap();
        store
            .load_ratings(&[
                RatingRecord::new("ana", "A1", "S1", 5, date(2021, 1, 1)),
                RatingRecord::new("bob", "A1", "S1", 4, date(2021, 2, 1)),
                RatingRecord::new("bob", "A2", "T1", 3, date(2021, 3, 1)),
                RatingRecord::new("cy", "B1", "S3", 2, date(2021, 4, 1)),
                RatingRecord::new("cy", "C1", "S4", 1, date(2023, 1, 1)),
            ])
            .unwrap();

        let songs = store.most_rated_songs(YearRange::single(2021), 2).unwrap();
        assert_eq!(
            songs,
            vec![
                RankedSong {
                    artist: "A1".to_string(),
                    title: "S1".to_string(),
                    count: 2
                },
                RankedSong {
                    artist: "B1".to_string(),
                    title: "S3".to_string(),
                    count: 1
                },
            ]
        );

        assert_eq!(
            store
                .most_engaged_users(YearRange::single(2021), 10)
                .unwrap(),
            ranked(&[("bob", 2), ("ana", 1), ("cy", 1)])
        );
        assert_eq!(
            store
                .most_engaged_users(YearRange::new(2022, 2023), 10)
                .unwrap(),
            ranked(&[("cy", 1)])
        );
        assert!(store
            .most_rated_songs(YearRange::single(2020), 10)
            .unwrap()
            .is_empty());
    }
}
