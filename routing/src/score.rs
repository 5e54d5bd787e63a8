use crate::geo::{haversine_km, Point};
use std::cmp::Ordering;

/// An authority with a complete profile, plus its current load as read
/// from the store.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: i64,
    pub base: Point,
    pub service_radius_km: f64,
    pub max_tasks_per_day: i64,
    pub active_tasks: i64,
    pub completion_rate: f64,
    pub service_areas: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReportSite {
    pub location: Point,
    pub city: String,
    pub state: String,
    pub locality: String,
}

/// Additive routing score. A candidate outside its own service radius
/// scores 0 and is excluded regardless of every other factor.
pub fn score(candidate: &Candidate, site: &ReportSite) -> f64 {
    let distance_km = haversine_km(candidate.base, site.location);
    if distance_km > candidate.service_radius_km {
        return 0.0;
    }
    let mut total = (30.0 - 2.0 * distance_km).max(5.0);
    total += workload_bonus(candidate.active_tasks, candidate.max_tasks_per_day);
    total += performance_bonus(candidate.completion_rate);
    if matches_service_area(candidate, site) {
        total += 15.0;
    }
    total
}

fn workload_bonus(active_tasks: i64, max_tasks_per_day: i64) -> f64 {
    if max_tasks_per_day <= 0 {
        return 0.0;
    }
    let load = active_tasks as f64 / max_tasks_per_day as f64;
    if load < 0.5 {
        20.0
    } else if load < 0.75 {
        10.0
    } else if load < 0.9 {
        5.0
    } else {
        0.0
    }
}

fn performance_bonus(completion_rate: f64) -> f64 {
    if completion_rate > 90.0 {
        10.0
    } else if completion_rate > 75.0 {
        5.0
    } else {
        0.0
    }
}

fn matches_service_area(candidate: &Candidate, site: &ReportSite) -> bool {
    candidate.service_areas.iter().any(|area| {
        area.eq_ignore_ascii_case(&site.locality)
            || area.eq_ignore_ascii_case(&site.city)
            || area.eq_ignore_ascii_case(&site.state)
    })
}

/// The highest-scoring in-radius candidate, or None when every candidate
/// is excluded. Ties break on lowest current workload, then lowest id.
pub fn best_candidate<'a>(
    candidates: &'a [Candidate],
    site: &ReportSite,
) -> Option<(&'a Candidate, f64)> {
    candidates
        .iter()
        .map(|c| (c, score(c, site)))
        .filter(|(_, s)| *s > 0.0)
        .max_by(|(a, sa), (b, sb)| {
            sa.partial_cmp(sb)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.active_tasks.cmp(&a.active_tasks))
                .then_with(|| b.id.cmp(&a.id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> ReportSite {
        ReportSite {
            location: Point { lat: 0.0, lng: 0.0 },
            city: "Springfield".to_string(),
            state: "Oregon".to_string(),
            locality: "Riverside".to_string(),
        }
    }

    // A pure north/south offset of d km is d / EARTH_RADIUS_KM radians.
    fn base_at_km(distance_km: f64) -> Point {
        let lat = (distance_km / crate::geo::EARTH_RADIUS_KM).to_degrees();
        Point { lat, lng: 0.0 }
    }

    fn candidate(id: i64, distance_km: f64) -> Candidate {
        Candidate {
            id,
            base: base_at_km(distance_km),
            service_radius_km: 10.0,
            active_tasks: 2,
            max_tasks_per_day: 10,
            completion_rate: 95.0,
            service_areas: vec![],
        }
    }

    #[test]
    fn near_candidate_scores_distance_workload_and_performance() {
        // 2 km away, 2/10 load, 95% completion: (30 - 4) + 20 + 10
        let c = candidate(1, 2.0);
        assert!((score(&c, &site()) - 56.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_radius_candidate_is_excluded() {
        let c = candidate(1, 15.0);
        assert_eq!(score(&c, &site()), 0.0);
        assert!(best_candidate(&[c], &site()).is_none());
    }

    #[test]
    fn distance_term_floors_at_five() {
        let mut c = candidate(1, 14.0);
        c.service_radius_km = 20.0;
        // 30 - 28 < 5, so the distance term contributes 5
        assert!((score(&c, &site()) - 35.0).abs() < 1e-6);
    }

    #[test]
    fn service_area_match_is_case_insensitive() {
        let mut c = candidate(1, 2.0);
        c.service_areas = vec!["RIVERSIDE".to_string()];
        assert!((score(&c, &site()) - 71.0).abs() < 1e-6);

        c.service_areas = vec!["oregon".to_string()];
        assert!((score(&c, &site()) - 71.0).abs() < 1e-6);
    }

    #[test]
    fn workload_bonus_bands() {
        for (active, expected) in [(4, 20.0), (5, 10.0), (7, 10.0), (8, 5.0), (9, 0.0)] {
            assert_eq!(workload_bonus(active, 10), expected, "active={}", active);
        }
    }

    #[test]
    fn equal_scores_break_on_workload_then_id() {
        // Same band, same score, different raw workloads
        let mut a = candidate(7, 2.0);
        a.active_tasks = 3;
        let b = candidate(4, 2.0);
        let picked = best_candidate(&[a, b], &site()).unwrap().0.id;
        assert_eq!(picked, 4);

        // Identical in everything but id
        let a = candidate(7, 2.0);
        let b = candidate(4, 2.0);
        let picked = best_candidate(&[a, b], &site()).unwrap().0.id;
        assert_eq!(picked, 4);
    }
}
