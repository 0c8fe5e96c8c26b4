//! BDD-style behavioral tests for timed registration and removal.
//!
//! Runs the catalog and scheduler actors against a scripted booking
//! service on a paused clock, following the Given-When-Then pattern.

mod common;

use std::time::Duration;

use chrono::TimeDelta;

use classbook_catalog::{DesiredState, EventKey, RegistrationId, UNREGISTERED};
use classbook_reconciler::{AttemptPolicy, ClientError, DesiredStateSource, Error, RegisterError};

use common::{HOUR, Harness, e1, listing, row, wanted};

fn e1_key() -> EventKey {
    e1().key()
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRATION BEHAVIORS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn given_unloaded_catalog_when_tick_then_nothing_happens() -> Result<(), Error> {
    // Given: No refresh has completed yet
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;

    // When: A tick runs
    let report = harness.scheduler.tick().await?;

    // Then: It is skipped
    assert!(report.skipped);
    assert!(report.spawned.is_empty());

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_wanted_event_when_window_opens_then_registered_once_and_persisted() -> Result<(), Error> {
    // Given: E1 starts in 25 hours and the user marked it "v"
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.script([Ok(RegistrationId::new(555))]);
    harness.reconciler.refresh().await?;

    // When: A tick starts an attempt and the window opens
    let report = harness.scheduler.tick().await?;
    assert_eq!(report.spawned, vec![e1_key()]);
    harness.advance_until_idle(2 * HOUR).await?;

    // Then: Exactly one call, made no earlier than the window opening
    let calls = harness.client.register_calls();
    assert_eq!(calls.len(), 1);
    let opens_at = e1().occurs_on.and_time(e1().start_time) - TimeDelta::hours(24);
    assert!(calls.iter().all(|call| call.at >= opens_at));

    // And: The registration is in the catalog and in the store
    let snapshot = harness.catalog.snapshot().await?;
    assert_eq!(
        snapshot.catalog.get(&e1_key()).and_then(|event| event.registration_id),
        Some(RegistrationId::new(555))
    );
    let stored = harness.source.row(&e1_key()).await;
    assert_eq!(stored.map(|row| row.registration_id), Some(555));

    // And: The attempt finished and is held for cleanup
    let status = harness.scheduler.status().await?;
    assert!(!status.is_in_flight(&e1_key()));
    assert!(status.is_pending_cleanup(&e1_key()));

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_in_flight_attempt_when_tick_again_then_no_duplicate() -> Result<(), Error> {
    // Given: An attempt already waiting for E1's window
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;

    // When: More ticks run before the window opens
    let second = harness.scheduler.tick().await?;
    let third = harness.scheduler.tick().await?;

    // Then: No further attempts are started
    assert!(second.spawned.is_empty());
    assert!(third.spawned.is_empty());
    assert_eq!(third.in_flight, 1);

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_confirmed_registration_when_tick_then_no_new_attempt() -> Result<(), Error> {
    // Given: E1 was booked by an earlier attempt
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.script([Ok(RegistrationId::new(555))]);
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // When: Refresh and tick run again
    harness.reconciler.refresh().await?;
    let report = harness.scheduler.tick().await?;

    // Then: Nothing new is attempted
    assert!(report.spawned.is_empty());
    assert_eq!(harness.client.register_calls().len(), 1);

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_window_not_open_when_retrying_then_backs_off_until_success() -> Result<(), Error> {
    // Given: The service refuses three times before accepting
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.script([
        Err(RegisterError::WindowNotOpen),
        Err(RegisterError::WindowNotOpen),
        Err(RegisterError::WindowNotOpen),
        Ok(RegistrationId::new(556)),
    ]);
    harness.reconciler.refresh().await?;

    // When: The attempt runs
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // Then: Four calls, spaced by the backoff
    let calls = harness.client.register_calls();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= TimeDelta::milliseconds(500));
    }
    let stored = harness.source.row(&e1_key()).await;
    assert_eq!(stored.map(|row| row.registration_id), Some(556));

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_full_class_when_registering_then_stops_after_one_call() -> Result<(), Error> {
    // Given: The class is already full
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.set_fallback(Err(RegisterError::EventFull));
    harness.reconciler.refresh().await?;

    // When: The attempt runs
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // Then: One call, no registration, nothing left in flight
    assert_eq!(harness.client.register_calls().len(), 1);
    let stored = harness.source.row(&e1_key()).await;
    assert_eq!(stored.map(|row| row.registration_id), Some(UNREGISTERED));
    let status = harness.scheduler.status().await?;
    assert!(status.in_flight.is_empty());
    assert!(status.pending_cleanup.is_empty());

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_rejected_full_class_when_tick_again_then_not_attempted_again() -> Result<(), Error> {
    // Given: E1's attempt was rejected because the class is full
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.set_fallback(Err(RegisterError::EventFull));
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;
    assert_eq!(harness.client.register_calls().len(), 1);

    // When: Later ticks run with E1 still marked "v"
    let second = harness.scheduler.tick().await?;
    let third = harness.scheduler.tick().await?;
    harness.advance_until_idle(HOUR).await?;

    // Then: No new attempt and still a single call
    assert!(second.spawned.is_empty());
    assert!(third.spawned.is_empty());
    assert_eq!(harness.client.register_calls().len(), 1);
    assert!(harness.scheduler.status().await?.is_settled(&e1_key()));

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_settled_event_when_user_unmarks_and_remarks_then_attempted_again() -> Result<(), Error> {
    // Given: E1 was given up on after a full-class rejection
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.set_fallback(Err(RegisterError::EventFull));
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // When: The user flips E1 to "x", a tick runs, then flips it back to "v"
    assert!(harness.source.set_desired(&e1_key(), DesiredState::WantCancelled).await);
    harness.scheduler.tick().await?;
    assert!(!harness.scheduler.status().await?.is_settled(&e1_key()));
    assert!(harness.source.set_desired(&e1_key(), DesiredState::WantBooked).await);
    let report = harness.scheduler.tick().await?;

    // Then: A fresh attempt starts
    assert_eq!(report.spawned, vec![e1_key()]);

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_transient_failures_when_budget_used_then_attempt_gives_up() -> Result<(), Error> {
    // Given: Every call fails and two retries are allowed
    let policy = AttemptPolicy {
        max_transient_retries: 2,
        ..AttemptPolicy::default()
    };
    let harness = Harness::with_policy(vec![e1()], vec![wanted(&e1())], policy, 6 * HOUR).await?;
    harness
        .client
        .set_fallback(Err(RegisterError::Other("502 bad gateway".to_string())));
    harness.reconciler.refresh().await?;

    // When: The attempt runs
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // Then: The first call plus two retries, then it stops
    assert_eq!(harness.client.register_calls().len(), 3);
    assert!(harness.scheduler.status().await?.in_flight.is_empty());

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_window_never_opens_when_retry_cap_reached_then_attempt_exhausted() -> Result<(), Error> {
    // Given: The service keeps saying the window is not open, three retries allowed
    let policy = AttemptPolicy {
        max_window_retries: 3,
        ..AttemptPolicy::default()
    };
    let harness = Harness::with_policy(vec![e1()], vec![wanted(&e1())], policy, 6 * HOUR).await?;
    harness.client.set_fallback(Err(RegisterError::WindowNotOpen));
    harness.reconciler.refresh().await?;

    // When: The attempt runs
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // Then: The first call plus three retries, then it gives up
    assert_eq!(harness.client.register_calls().len(), 4);
    let status = harness.scheduler.status().await?;
    assert!(status.in_flight.is_empty());
    assert!(status.is_settled(&e1_key()));

    // And: The next tick does not start over
    let report = harness.scheduler.tick().await?;
    assert!(report.spawned.is_empty());
    assert_eq!(harness.client.register_calls().len(), 4);

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_waiting_attempt_when_user_unmarks_then_cancelled_without_call() -> Result<(), Error> {
    // Given: An attempt waiting for E1's window
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;

    // When: The user flips E1 to "x" and the next tick runs
    assert!(harness.source.set_desired(&e1_key(), DesiredState::WantCancelled).await);
    let report = harness.scheduler.tick().await?;
    assert_eq!(report.cancelled, vec![e1_key()]);

    // Then: The window passes without any call
    tokio::time::sleep(2 * HOUR).await;
    assert!(harness.client.register_calls().is_empty());
    assert!(harness.scheduler.status().await?.in_flight.is_empty());

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_waiting_attempt_when_event_unlisted_then_cancelled() -> Result<(), Error> {
    // Given: An attempt waiting for E1's window
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;

    // When: The service stops listing E1
    harness.client.set_listings(Ok(Vec::new()));
    harness.reconciler.refresh().await?;
    let report = harness.scheduler.tick().await?;

    // Then: The attempt is cancelled
    assert_eq!(report.cancelled, vec![e1_key()]);
    tokio::time::sleep(2 * HOUR).await;
    assert!(harness.client.register_calls().is_empty());

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_failed_listing_when_refresh_then_catalog_keeps_previous_state() -> Result<(), Error> {
    // Given: A loaded catalog
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.reconciler.refresh().await?;

    // When: The next listing fails
    harness
        .client
        .set_listings(Err(ClientError::new("session expired")));
    let result = harness.reconciler.refresh().await;

    // Then: The cycle is skipped and E1 is still known
    assert!(result.is_err());
    let snapshot = harness.catalog.snapshot().await?;
    assert!(snapshot.catalog.contains(&e1_key()));

    harness.stop().await;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// REMOVAL BEHAVIORS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn given_unwanted_booking_when_sweep_then_cancelled_and_cleared() -> Result<(), Error> {
    // Given: E2 is booked under 777 but marked "x"
    let e2 = listing(2002, 11, 18);
    let harness = Harness::new(
        vec![e2.clone()],
        vec![row(&e2, DesiredState::WantCancelled, Some(777))],
    )
    .await?;
    harness.reconciler.refresh().await?;

    // When: The removal sweep runs
    let report = harness.scheduler.sweep().await?;

    // Then: The booking is dropped remotely and cleared locally
    assert_eq!(report.released, vec![e2.key()]);
    assert_eq!(harness.client.cancel_calls(), vec![RegistrationId::new(777)]);
    let snapshot = harness.catalog.snapshot().await?;
    assert_eq!(
        snapshot.catalog.get(&e2.key()).map(|event| event.is_booked()),
        Some(false)
    );
    let stored = harness.source.row(&e2.key()).await;
    assert_eq!(stored.map(|row| row.registration_id), Some(UNREGISTERED));

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_failed_cancel_when_sweep_then_booking_kept_for_next_sweep() -> Result<(), Error> {
    // Given: E2 is booked but the service refuses cancellations
    let e2 = listing(2002, 11, 18);
    let harness = Harness::new(
        vec![e2.clone()],
        vec![row(&e2, DesiredState::WantCancelled, Some(777))],
    )
    .await?;
    harness.reconciler.refresh().await?;
    harness.client.fail_cancels(Some(ClientError::new("timeout")));

    // When: The sweep runs, then runs again once the service recovers
    let first = harness.scheduler.sweep().await?;
    harness.client.fail_cancels(None);
    let second = harness.scheduler.sweep().await?;

    // Then: The first sweep reports the failure and the second succeeds
    assert_eq!(first.failed.len(), 1);
    assert!(first.released.is_empty());
    assert_eq!(second.released, vec![e2.key()]);

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_rows_read_before_sweep_when_refresh_merges_after_it_then_cancelled_booking_stays_gone()
-> Result<(), Error> {
    // Given: E2 is booked under 777, marked "x", and a refresh has read the rows
    let e2 = listing(2002, 11, 18);
    let harness = Harness::new(
        vec![e2.clone()],
        vec![row(&e2, DesiredState::WantCancelled, Some(777))],
    )
    .await?;
    harness.reconciler.refresh().await?;
    let rows_read_early = harness.source.read_all().await?;

    // When: The sweep cancels 777, then the refresh merges what it read earlier
    let report = harness.scheduler.sweep().await?;
    assert_eq!(report.released, vec![e2.key()]);
    harness
        .catalog
        .merge(vec![e2.clone()], rows_read_early, common::date(9))
        .await?;

    // Then: The catalog does not hold 777 again
    let snapshot = harness.catalog.snapshot().await?;
    assert_eq!(
        snapshot.catalog.get(&e2.key()).and_then(|event| event.registration_id),
        None
    );

    // And: Re-marking "v" starts a new attempt and the next sweep cancels nothing
    assert!(harness.source.set_desired(&e2.key(), DesiredState::WantBooked).await);
    let tick = harness.scheduler.tick().await?;
    assert_eq!(tick.spawned, vec![e2.key()]);
    assert_eq!(harness.client.cancel_calls(), vec![RegistrationId::new(777)]);

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_stale_stored_row_after_cancel_when_synced_then_booking_not_restored() -> Result<(), Error> {
    // Given: E2's booking 777 was cancelled by a sweep
    let e2 = listing(2002, 11, 18);
    let stale = row(&e2, DesiredState::WantCancelled, Some(777));
    let harness = Harness::new(vec![e2.clone()], vec![stale.clone()]).await?;
    harness.reconciler.refresh().await?;
    harness.scheduler.sweep().await?;

    // When: The store still holds the old row, as after a failed write
    harness.source.write_rows(e2.occurs_on, vec![stale]).await?;
    let second = harness.scheduler.sweep().await?;

    // Then: The sync keeps the registration cleared and nothing is cancelled twice
    assert!(second.released.is_empty());
    assert!(second.failed.is_empty());
    assert_eq!(harness.client.cancel_calls(), vec![RegistrationId::new(777)]);
    let snapshot = harness.catalog.snapshot().await?;
    assert_eq!(
        snapshot.catalog.get(&e2.key()).map(|event| event.is_booked()),
        Some(false)
    );

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_confirmed_registration_when_user_unmarks_then_sweep_cancels_it() -> Result<(), Error> {
    // Given: E1 was booked by an attempt under 555
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.script([Ok(RegistrationId::new(555))]);
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // When: The user flips E1 to "x" and the sweep runs
    assert!(harness.source.set_desired(&e1_key(), DesiredState::WantCancelled).await);
    let report = harness.scheduler.sweep().await?;

    // Then: 555 is cancelled and no longer awaits cleanup
    assert_eq!(report.released, vec![e1_key()]);
    assert_eq!(harness.client.cancel_calls(), vec![RegistrationId::new(555)]);
    assert!(!harness.scheduler.status().await?.is_pending_cleanup(&e1_key()));

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_booked_event_far_ahead_when_sweep_then_wakes_before_cancellation_point() -> Result<(), Error> {
    // Given: A booked, wanted class starting in 10 hours and a 6 hour ceiling
    let e3 = listing(3003, 9, 16);
    let harness = Harness::new(
        vec![e3.clone()],
        vec![row(&e3, DesiredState::WantBooked, Some(900))],
    )
    .await?;
    harness.reconciler.refresh().await?;

    // When: The sweep plans its next wake-up
    let report = harness.scheduler.sweep().await?;

    // Then: Three hours before the start, which is beyond the ceiling
    assert!(report.released.is_empty());
    assert!(report.next_wake <= 7 * HOUR);
    assert!(report.next_wake > 7 * HOUR - Duration::from_secs(1));
    assert_eq!(report.next_wake.min(6 * HOUR), 6 * HOUR);

    harness.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn given_nothing_booked_or_wanted_when_sweep_then_sleeps_the_ceiling() -> Result<(), Error> {
    // Given: One listed class nobody wants
    let harness = Harness::new(vec![e1()], Vec::new()).await?;
    harness.reconciler.refresh().await?;

    // When: The sweep runs
    let report = harness.scheduler.sweep().await?;

    // Then: The ceiling decides
    assert_eq!(report.next_wake, 6 * HOUR);

    harness.stop().await;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// REAPER BEHAVIORS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn given_confirmed_registration_when_reaped_then_registry_is_empty() -> Result<(), Error> {
    // Given: One registration awaiting cleanup
    let harness = Harness::new(vec![e1()], vec![wanted(&e1())]).await?;
    harness.client.script([Ok(RegistrationId::new(555))]);
    harness.reconciler.refresh().await?;
    harness.scheduler.tick().await?;
    harness.advance_until_idle(2 * HOUR).await?;

    // When: The reaper runs
    let reaped = harness.scheduler.reap().await?;

    // Then: The registry is cleared and the catalog still knows the booking
    assert_eq!(reaped, 1);
    assert!(harness.scheduler.status().await?.pending_cleanup.is_empty());
    assert!(harness.reconciler.refresh().await.is_ok());
    let report = harness.scheduler.tick().await?;
    assert!(report.spawned.is_empty());

    harness.stop().await;
    Ok(())
}
