mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Timelike;
use diesel::{ExpressionMethods, QueryDsl, RunQueryDsl};
use tablebook_reservation_service::availability::{OpeningHours, Schedule, SlotStatus};
use tablebook_reservation_service::error::ServiceError;
use tablebook_reservation_service::models::{ReservationStatus, Restaurant};
use tablebook_reservation_service::reservation::{
    NewReservation, OwnerUpdate, ReservationManager, ReservationPatch,
};
use tablebook_reservation_service::schema;

use common::{
    admin, at, connect, date, diner, outbox_len, owner, seed_restaurant, setup_database, time,
};

const NOW: &str = "2030-06-01T10:00:00Z";
const DAY: &str = "2030-06-03";

fn single_table() -> Schedule {
    Schedule {
        table_count: 1,
        ..Schedule::default()
    }
}

fn request(restaurant: &Restaurant, day: &str, at_time: &str, party_size: u32) -> NewReservation {
    NewReservation {
        restaurant_id: restaurant.id,
        date: date(day),
        time: time(at_time),
        party_size,
        special_requests: None,
        occasion: None,
    }
}

fn status_update(status: ReservationStatus) -> OwnerUpdate {
    OwnerUpdate {
        status: Some(status),
        ..OwnerUpdate::default()
    }
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_single_table_day_blocks_only_booked_slot() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);
    manager
        .update_settings(&owner, restaurant.id, single_table())
        .unwrap();

    let slots = manager.availability(restaurant.id, date(DAY), 2).unwrap();
    let times: Vec<String> = slots
        .iter()
        .map(|s| format!("{:02}:{:02}", s.time.hour(), s.time.minute()))
        .collect();
    assert_eq!(
        times,
        vec!["09:00", "10:30", "12:00", "13:30", "15:00", "16:30", "18:00", "19:30"]
    );
    assert!(slots
        .iter()
        .all(|s| s.available_tables == 1 && s.status == SlotStatus::Available));

    manager
        .create(&diner(), request(&restaurant, DAY, "09:00", 2))
        .unwrap();

    let slots = manager.availability(restaurant.id, date(DAY), 2).unwrap();
    assert_eq!(slots[0].status, SlotStatus::Unavailable);
    assert_eq!(slots[0].available_tables, 0);
    assert_eq!(slots[1].time, time("10:30"));
    assert_eq!(slots[1].status, SlotStatus::Available);
    assert!(slots[1..].iter().all(|s| s.available_tables == 1));
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_full_slot_rejects_second_booking() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);
    manager
        .update_settings(&owner, restaurant.id, single_table())
        .unwrap();

    let first = manager
        .create(&diner(), request(&restaurant, DAY, "18:00", 2))
        .unwrap();
    assert_eq!(first.status, ReservationStatus::Pending);

    let err = manager
        .create(&diner(), request(&restaurant, DAY, "18:00", 2))
        .unwrap_err();
    assert!(matches!(err, ServiceError::CapacityConflict));

    // Off-grid and out-of-range requests never reach the capacity check.
    assert!(matches!(
        manager.create(&diner(), request(&restaurant, DAY, "18:15", 2)),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        manager.create(&diner(), request(&restaurant, DAY, "19:30", 21)),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        manager.create(&owner, request(&restaurant, DAY, "19:30", 2)),
        Err(ServiceError::Forbidden)
    ));

    assert_eq!(outbox_len(&mut connect()), 1);
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_concurrent_bookings_never_exceed_capacity() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let clock = at(NOW);
    ReservationManager::new(&mut conn, &clock)
        .update_settings(
            &owner,
            restaurant.id,
            Schedule {
                table_count: 3,
                ..Schedule::default()
            },
        )
        .unwrap();

    let attempts = 8;
    let barrier = Arc::new(Barrier::new(attempts));
    let handles: Vec<_> = (0..attempts)
        .map(|_| {
            let barrier = barrier.clone();
            let booking = request(&restaurant, DAY, "19:30", 2);
            thread::spawn(move || {
                let mut conn = connect();
                let clock = at(NOW);
                barrier.wait();
                ReservationManager::new(&mut conn, &clock).create(&diner(), booking)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let booked = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(booked, 3);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ServiceError::CapacityConflict)));

    let stored: i64 = schema::reservations::table
        .filter(schema::reservations::restaurant_id.eq(restaurant.id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(stored, 3);
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_cancel_respects_cutoff_boundary() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let ten_to_ten = OpeningHours {
        opens_at: time("10:00"),
        closes_at: time("22:00"),
    };
    let schedule = Schedule {
        weekly_hours: [Some(ten_to_ten); 7],
        table_count: 1,
        ..Schedule::default()
    };
    let diner = diner();

    let reservation = {
        let clock = at(NOW);
        let mut manager = ReservationManager::new(&mut conn, &clock);
        manager
            .update_settings(&owner, restaurant.id, schedule)
            .unwrap();
        manager
            .create(&diner, request(&restaurant, "2030-06-02", "19:00", 2))
            .unwrap()
    };

    for now in ["2030-06-02T17:30:00Z", "2030-06-02T17:00:00Z"] {
        let clock = at(now);
        let err = ReservationManager::new(&mut conn, &clock)
            .cancel(&diner, reservation.id)
            .unwrap_err();
        assert!(matches!(err, ServiceError::CutoffViolation), "{now}");
    }

    let clock = at("2030-06-02T16:59:59Z");
    let mut manager = ReservationManager::new(&mut conn, &clock);
    assert!(matches!(
        manager.cancel(&common::diner(), reservation.id),
        Err(ServiceError::NotFound)
    ));
    let cancelled = manager.cancel(&diner, reservation.id).unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);

    assert!(matches!(
        manager.cancel(&diner, reservation.id),
        Err(ServiceError::TerminalState(ReservationStatus::Cancelled))
    ));

    let slots = manager
        .availability(restaurant.id, date("2030-06-02"), 2)
        .unwrap();
    let seven = slots.iter().find(|s| s.time == time("19:00")).unwrap();
    assert_eq!(seven.available_tables, 1);
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_owner_walks_reservation_to_completion() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let diner = diner();
    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);

    let reservation = manager
        .create(&diner, request(&restaurant, DAY, "19:30", 4))
        .unwrap();

    assert!(matches!(
        manager.transition(&common::owner(), reservation.id, status_update(ReservationStatus::Confirmed)),
        Err(ServiceError::NotFound)
    ));
    assert!(matches!(
        manager.transition(&diner, reservation.id, status_update(ReservationStatus::Confirmed)),
        Err(ServiceError::Forbidden)
    ));

    let confirmed = manager
        .transition(&owner, reservation.id, status_update(ReservationStatus::Confirmed))
        .unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);

    let repeated = manager
        .transition(&owner, reservation.id, status_update(ReservationStatus::Confirmed))
        .unwrap();
    assert_eq!(repeated, confirmed);
    assert_eq!(outbox_len(&mut connect()), 2);

    let seated = manager
        .transition(
            &owner,
            reservation.id,
            OwnerUpdate {
                status: Some(ReservationStatus::Seated),
                internal_note: Some("window seat".to_string()),
                assigned_table_id: Some("T4".to_string()),
            },
        )
        .unwrap();
    assert_eq!(seated.status, ReservationStatus::Seated);
    assert_eq!(seated.assigned_table_id.as_deref(), Some("T4"));
    assert_eq!(seated.internal_note.as_deref(), Some("window seat"));

    assert!(matches!(
        manager.transition(&owner, reservation.id, status_update(ReservationStatus::Cancelled)),
        Err(ServiceError::InvalidTransition {
            from: ReservationStatus::Seated,
            to: ReservationStatus::Cancelled,
        })
    ));

    let completed = manager
        .transition(&admin(), reservation.id, status_update(ReservationStatus::Completed))
        .unwrap();
    assert_eq!(completed.status, ReservationStatus::Completed);

    for target in [ReservationStatus::Pending, ReservationStatus::Completed] {
        assert!(matches!(
            manager.transition(&owner, reservation.id, status_update(target)),
            Err(ServiceError::TerminalState(ReservationStatus::Completed))
        ));
    }
    assert_eq!(outbox_len(&mut connect()), 4);
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_modify_rechecks_capacity_without_counting_itself() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let (alice, bob) = (diner(), diner());
    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);
    manager
        .update_settings(&owner, restaurant.id, single_table())
        .unwrap();

    let mine = manager
        .create(&alice, request(&restaurant, DAY, "09:00", 2))
        .unwrap();
    manager
        .create(&bob, request(&restaurant, DAY, "12:00", 2))
        .unwrap();

    let bigger = manager
        .modify(
            &alice,
            mine.id,
            ReservationPatch {
                party_size: Some(4),
                occasion: Some("birthday".to_string()),
                ..ReservationPatch::default()
            },
        )
        .unwrap();
    assert_eq!(bigger.party_size, 4);
    assert_eq!(bigger.occasion.as_deref(), Some("birthday"));

    let to_noon = ReservationPatch {
        time: Some(time("12:00")),
        ..ReservationPatch::default()
    };
    assert!(matches!(
        manager.modify(&alice, mine.id, to_noon.clone()),
        Err(ServiceError::CapacityConflict)
    ));
    assert!(matches!(
        manager.modify(&bob, mine.id, to_noon),
        Err(ServiceError::NotFound)
    ));

    let moved = manager
        .modify(
            &alice,
            mine.id,
            ReservationPatch {
                time: Some(time("13:30")),
                ..ReservationPatch::default()
            },
        )
        .unwrap();
    assert_eq!(moved.reservation_time, time("13:30"));
    assert_eq!(moved.occasion.as_deref(), Some("birthday"));

    let slots = manager.availability(restaurant.id, date(DAY), 2).unwrap();
    assert_eq!(slots[0].available_tables, 1);
    assert_eq!(outbox_len(&mut connect()), 4);

    let late = at("2030-06-03T12:00:00Z");
    assert!(matches!(
        ReservationManager::new(&mut conn, &late).modify(
            &alice,
            mine.id,
            ReservationPatch {
                party_size: Some(3),
                ..ReservationPatch::default()
            }
        ),
        Err(ServiceError::CutoffViolation)
    ));
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_list_scopes_by_role() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let first = seed_restaurant(&mut conn, &owner);
    let second = seed_restaurant(&mut conn, &common::owner());
    let (alice, bob) = (diner(), diner());
    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);

    manager
        .create(&alice, request(&first, DAY, "18:00", 2))
        .unwrap();
    manager
        .create(&alice, request(&second, "2030-06-04", "18:00", 2))
        .unwrap();
    manager
        .create(&bob, request(&first, DAY, "19:30", 2))
        .unwrap();

    assert_eq!(manager.list(&alice, None, None).unwrap().len(), 2);
    assert_eq!(manager.list(&alice, Some(first.id), None).unwrap().len(), 1);
    assert_eq!(manager.list(&bob, None, None).unwrap().len(), 1);

    let at_first = manager.list(&owner, Some(first.id), None).unwrap();
    assert_eq!(at_first.len(), 2);
    assert!(at_first[0].reservation_time < at_first[1].reservation_time);
    assert!(manager
        .list(&owner, Some(first.id), Some(date("2030-06-04")))
        .unwrap()
        .is_empty());

    assert!(matches!(
        manager.list(&owner, None, None),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        manager.list(&owner, Some(second.id), None),
        Err(ServiceError::NotFound)
    ));

    let theirs = manager.list(&alice, None, None).unwrap()[0].clone();
    assert!(matches!(
        manager.get(&bob, theirs.id),
        Err(ServiceError::NotFound)
    ));
    assert_eq!(manager.get(&alice, theirs.id).unwrap(), theirs);
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_settings_defaults_and_ownership() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);

    assert_eq!(manager.settings(restaurant.id).unwrap(), Schedule::default());

    let mut closed_sundays = Schedule::default();
    closed_sundays.weekly_hours[6] = None;
    assert!(matches!(
        manager.update_settings(&common::owner(), restaurant.id, closed_sundays.clone()),
        Err(ServiceError::NotFound)
    ));
    assert!(matches!(
        manager.update_settings(&diner(), restaurant.id, closed_sundays.clone()),
        Err(ServiceError::Forbidden)
    ));

    manager
        .update_settings(&owner, restaurant.id, closed_sundays.clone())
        .unwrap();
    assert_eq!(manager.settings(restaurant.id).unwrap(), closed_sundays);

    // 2030-06-09 is a Sunday.
    assert!(manager
        .availability(restaurant.id, date("2030-06-09"), 2)
        .unwrap()
        .is_empty());
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_oversized_settings_are_rejected() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);

    assert!(matches!(
        manager.update_settings(
            &owner,
            restaurant.id,
            Schedule {
                advance_booking_days: i32::MAX as u32,
                ..Schedule::default()
            },
        ),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        manager.update_settings(
            &owner,
            restaurant.id,
            Schedule {
                cancellation_cutoff_hours: 100_000,
                ..Schedule::default()
            },
        ),
        Err(ServiceError::Validation(_))
    ));

    assert_eq!(manager.settings(restaurant.id).unwrap(), Schedule::default());
    assert!(!manager
        .availability(restaurant.id, date(DAY), 2)
        .unwrap()
        .is_empty());
}

#[test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
fn test_inactive_restaurant_offers_nothing() {
    let (_guard, mut conn) = setup_database();
    let owner = owner();
    let restaurant = seed_restaurant(&mut conn, &owner);
    diesel::update(schema::restaurants::table.find(restaurant.id))
        .set(schema::restaurants::is_active.eq(false))
        .execute(&mut conn)
        .unwrap();

    let clock = at(NOW);
    let mut manager = ReservationManager::new(&mut conn, &clock);
    assert!(manager
        .availability(restaurant.id, date(DAY), 2)
        .unwrap()
        .is_empty());
    assert!(matches!(
        manager.create(&diner(), request(&restaurant, DAY, "18:00", 2)),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        manager.availability(uuid::Uuid::new_v4(), date(DAY), 2),
        Err(ServiceError::NotFound)
    ));
}
