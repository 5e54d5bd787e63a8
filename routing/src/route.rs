use crate::geo::{haversine_km, Point};
use std::cmp::Ordering;
use tracing::debug;

pub const DEFAULT_AVG_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Next stop minimizes travel distance from the current position.
    Distance,
    /// Next stop minimizes its own service-time estimate. Travel distance
    /// is intentionally not a factor under this objective.
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

/// Keyword classification of a waste category into a collection priority.
pub fn classify_priority(category: &str) -> Priority {
    let category = category.to_ascii_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| category.contains(k));
    if matches(&["hazardous", "medical", "electronic"]) {
        Priority::Urgent
    } else if matches(&["plastic", "metal", "mixed"]) {
        Priority::High
    } else if matches(&["organic", "paper", "food"]) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Per-stop service time estimate in minutes.
pub fn service_time_minutes(category: &str, priority: Priority) -> i64 {
    let category = category.to_ascii_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| category.contains(k));
    let mut minutes = 15;
    if matches(&["hazardous", "medical"]) {
        minutes += 10;
    }
    if matches(&["construction", "bulk"]) {
        minutes += 20;
    }
    if priority == Priority::Urgent {
        minutes += 5;
    }
    minutes
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: i64,
    pub location: Point,
    pub address: String,
    pub category: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedStop {
    pub stop: Stop,
    pub distance_from_previous_km: f64,
    pub estimated_minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteStats {
    pub total_distance_km: f64,
    pub travel_minutes: i64,
    pub collection_minutes: i64,
    pub total_minutes: i64,
    pub total_stops: usize,
}

/// Greedy tour construction: repeatedly take the best unvisited stop under
/// the objective, starting from `start`. Ties break on lowest stop id.
pub fn optimize(mut remaining: Vec<Stop>, start: Point, objective: Objective) -> Vec<RoutedStop> {
    let mut route = Vec::with_capacity(remaining.len());
    let mut position = start;
    while !remaining.is_empty() {
        let next = pick_next(&remaining, position, objective);
        let stop = remaining.swap_remove(next);
        let leg_km = haversine_km(position, stop.location);
        position = stop.location;
        let estimated_minutes = service_time_minutes(&stop.category, stop.priority);
        route.push(RoutedStop {
            stop,
            distance_from_previous_km: leg_km,
            estimated_minutes,
        });
    }
    debug!("sequenced {} stops", route.len());
    route
}

fn pick_next(remaining: &[Stop], position: Point, objective: Objective) -> usize {
    let key = |stop: &Stop| match objective {
        Objective::Distance => haversine_km(position, stop.location),
        Objective::Time => service_time_minutes(&stop.category, stop.priority) as f64,
    };
    let mut best = 0;
    for ix in 1..remaining.len() {
        let ordering = key(&remaining[ix])
            .partial_cmp(&key(&remaining[best]))
            .unwrap_or(Ordering::Equal)
            .then_with(|| remaining[ix].id.cmp(&remaining[best].id));
        if ordering == Ordering::Less {
            best = ix;
        }
    }
    best
}

/// Aggregate statistics for a sequenced route. Distance rounds to two
/// decimals, times to whole minutes.
pub fn route_stats(route: &[RoutedStop], avg_speed_kmh: f64) -> RouteStats {
    let raw_distance: f64 = route.iter().map(|s| s.distance_from_previous_km).sum();
    let collection_minutes: i64 = route.iter().map(|s| s.estimated_minutes).sum();
    let travel_minutes = (raw_distance / avg_speed_kmh * 60.0).round() as i64;
    RouteStats {
        total_distance_km: round2(raw_distance),
        travel_minutes,
        collection_minutes,
        total_minutes: travel_minutes + collection_minutes,
        total_stops: route.len(),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(any(test, feature = "test"))]
pub mod test_utils {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_stops(max_len: usize) -> impl Strategy<Value = Vec<Stop>> {
        let categories = prop::sample::select(vec![
            "hazardous", "medical", "electronic", "plastic", "metal", "organic", "paper",
            "construction", "bulk", "glass",
        ]);
        prop::collection::vec((-80.0f64..80.0, -179.0f64..179.0, categories), 0..max_len).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(ix, (lat, lng, category))| Stop {
                        id: ix as i64,
                        location: Point { lat, lng },
                        address: format!("site {}", ix),
                        category: category.to_string(),
                        priority: classify_priority(category),
                    })
                    .collect()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn stop(id: i64, lat: f64, lng: f64, category: &str) -> Stop {
        Stop {
            id,
            location: Point { lat, lng },
            address: format!("site {}", id),
            category: category.to_string(),
            priority: classify_priority(category),
        }
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify_priority("Hazardous chemicals"), Priority::Urgent);
        assert_eq!(classify_priority("medical"), Priority::Urgent);
        assert_eq!(classify_priority("electronic"), Priority::Urgent);
        assert_eq!(classify_priority("PLASTIC"), Priority::High);
        assert_eq!(classify_priority("mixed waste"), Priority::High);
        assert_eq!(classify_priority("organic"), Priority::Medium);
        assert_eq!(classify_priority("food scraps"), Priority::Medium);
        assert_eq!(classify_priority("glass"), Priority::Low);
    }

    #[test]
    fn service_time_table() {
        assert_eq!(service_time_minutes("glass", Priority::Low), 15);
        // hazardous: 15 + 10, urgent priority: + 5
        assert_eq!(service_time_minutes("hazardous", Priority::Urgent), 30);
        assert_eq!(service_time_minutes("bulk items", Priority::Low), 35);
        // construction debris classified urgent elsewhere would stack
        assert_eq!(service_time_minutes("construction", Priority::Urgent), 40);
    }

    #[test]
    fn distance_objective_visits_nearest_first() {
        let start = Point { lat: 0.0, lng: 0.0 };
        let stops = vec![
            stop(1, 0.0, 0.3, "glass"),
            stop(2, 0.0, 0.1, "glass"),
            stop(3, 0.0, 0.2, "glass"),
        ];
        let route = optimize(stops, start, Objective::Distance);
        let order: Vec<i64> = route.iter().map(|s| s.stop.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn total_distance_is_the_sum_of_consecutive_legs() {
        let start = Point { lat: 0.0, lng: 0.0 };
        let stops = vec![
            stop(1, 0.0, 0.3, "glass"),
            stop(2, 0.0, 0.1, "glass"),
            stop(3, 0.0, 0.2, "glass"),
        ];
        let route = optimize(stops, start, Objective::Distance);
        let legs: f64 = route.iter().map(|s| s.distance_from_previous_km).sum();
        let stats = route_stats(&route, DEFAULT_AVG_SPEED_KMH);
        assert!((stats.total_distance_km - (legs * 100.0).round() / 100.0).abs() < 1e-9);
        // three legs of ~11.12 km each
        assert!((legs - 33.36).abs() < 0.01, "got {}", legs);
    }

    #[test]
    fn time_objective_ignores_travel_distance() {
        let start = Point { lat: 0.0, lng: 0.0 };
        // the nearby stop has a long service time, the distant one is quick
        let stops = vec![
            stop(1, 0.0, 0.001, "bulk"),
            stop(2, 0.0, 1.0, "paper"),
        ];
        let route = optimize(stops, start, Objective::Time);
        let order: Vec<i64> = route.iter().map(|s| s.stop.id).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn ties_break_on_lowest_id() {
        let start = Point { lat: 0.0, lng: 0.0 };
        let stops = vec![
            stop(9, 0.0, 0.1, "glass"),
            stop(4, 0.0, 0.1, "glass"),
        ];
        let route = optimize(stops, start, Objective::Distance);
        let order: Vec<i64> = route.iter().map(|s| s.stop.id).collect();
        assert_eq!(order, vec![4, 9]);
    }

    #[test]
    fn travel_time_uses_the_average_speed() {
        let start = Point { lat: 0.0, lng: 0.0 };
        // one stop roughly 20 km due north
        let lat = (20.0 / crate::geo::EARTH_RADIUS_KM).to_degrees();
        let route = optimize(vec![stop(1, lat, 0.0, "glass")], start, Objective::Distance);
        let stats = route_stats(&route, 40.0);
        assert_eq!(stats.travel_minutes, 30);
        assert_eq!(stats.collection_minutes, 15);
        assert_eq!(stats.total_minutes, 45);
        assert_eq!(stats.total_stops, 1);
    }

    #[test]
    fn empty_input_produces_an_empty_route() {
        let start = Point { lat: 0.0, lng: 0.0 };
        let route = optimize(vec![], start, Objective::Distance);
        assert!(route.is_empty());
        let stats = route_stats(&route, DEFAULT_AVG_SPEED_KMH);
        assert_eq!(stats.total_distance_km, 0.0);
        assert_eq!(stats.total_minutes, 0);
    }

    proptest! {
        #[test]
        fn route_is_a_permutation_of_the_input(stops in super::test_utils::arb_stops(16)) {
            let start = Point { lat: 0.0, lng: 0.0 };
            let input_ids: HashSet<i64> = stops.iter().map(|s| s.id).collect();
            let route = optimize(stops, start, Objective::Distance);
            let routed_ids: HashSet<i64> = route.iter().map(|s| s.stop.id).collect();
            prop_assert_eq!(route.len(), input_ids.len());
            prop_assert_eq!(input_ids, routed_ids);
        }

        #[test]
        fn each_leg_is_greedy_minimal(stops in super::test_utils::arb_stops(12)) {
            let start = Point { lat: 0.0, lng: 0.0 };
            let route = optimize(stops, start, Objective::Distance);
            let mut position = start;
            for (ix, routed) in route.iter().enumerate() {
                let chosen = haversine_km(position, routed.stop.location);
                for later in route.iter().skip(ix + 1) {
                    let alternative = haversine_km(position, later.stop.location);
                    prop_assert!(
                        chosen <= alternative + 1e-9,
                        "stop {} chosen at {} km over {} at {} km",
                        routed.stop.id, chosen, later.stop.id, alternative
                    );
                }
                position = routed.stop.location;
            }
        }

        #[test]
        fn annotated_legs_match_consecutive_distances(stops in super::test_utils::arb_stops(12)) {
            let start = Point { lat: 0.0, lng: 0.0 };
            let route = optimize(stops, start, Objective::Distance);
            let mut position = start;
            for routed in &route {
                let leg = haversine_km(position, routed.stop.location);
                prop_assert!((routed.distance_from_previous_km - leg).abs() < 1e-9);
                position = routed.stop.location;
            }
            let sum: f64 = route.iter().map(|s| s.distance_from_previous_km).sum();
            let stats = route_stats(&route, DEFAULT_AVG_SPEED_KMH);
            prop_assert!((stats.total_distance_km - (sum * 100.0).round() / 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn time_objective_orders_by_service_time_then_id() {
        let start = Point { lat: 0.0, lng: 0.0 };
        let stops = vec![
            stop(1, 0.0, 0.1, "hazardous"), // 30 min
            stop(2, 0.0, 0.2, "glass"),     // 15 min
            stop(3, 0.0, 0.3, "paper"),     // 15 min
        ];
        let route = optimize(stops, start, Objective::Time);
        let order: Vec<i64> = route.iter().map(|s| s.stop.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn greedy_is_order_insensitive() {
        let start = Point { lat: 0.0, lng: 0.0 };
        let stops = vec![
            stop(1, 0.0, 0.3, "glass"),
            stop(2, 0.0, 0.1, "glass"),
            stop(3, 0.0, 0.2, "glass"),
        ];
        for permutation in stops.iter().cloned().permutations(stops.len()) {
            let route = optimize(permutation, start, Objective::Distance);
            let order: Vec<i64> = route.iter().map(|s| s.stop.id).collect();
            assert_eq!(order, vec![2, 3, 1]);
        }
    }
}
