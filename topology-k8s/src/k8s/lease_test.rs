use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use k8s_openapi::api::coordination::v1::LeaseSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;

use crate::k8s::lease::{claim, is_within_lease, next_action, process_identity, LeaseAction, LeaseConfig};

const IDENTITY: &str = "alice@workstation";

fn config() -> Result<LeaseConfig> {
    LeaseConfig::new("ledger", "alpha-lease", IDENTITY.into(), Duration::seconds(20), Duration::seconds(10), Duration::seconds(60))
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn spec_held_by(holder: &str, renewed_secs_ago: i64) -> LeaseSpec {
    let now = fixed_now();
    LeaseSpec {
        holder_identity: Some(holder.into()),
        lease_duration_seconds: Some(20),
        renew_time: Some(MicroTime(now - Duration::seconds(renewed_secs_ago))),
        acquire_time: Some(MicroTime(now - Duration::seconds(300))),
        lease_transitions: Some(3),
    }
}

#[test]
fn lease_config_rejects_invalid_timings() -> Result<()> {
    let res = LeaseConfig::new("ledger", "alpha-lease", IDENTITY.into(), Duration::seconds(10), Duration::seconds(10), Duration::seconds(60));
    assert!(res.is_err(), "expected a renew interval equal to the lease duration to be rejected");
    let res = LeaseConfig::new("ledger", "alpha-lease", "".into(), Duration::seconds(20), Duration::seconds(10), Duration::seconds(60));
    assert!(res.is_err(), "expected an empty identity to be rejected");
    let res = LeaseConfig::new("ledger", "alpha-lease", IDENTITY.into(), Duration::seconds(20), Duration::milliseconds(500), Duration::seconds(60));
    assert!(res.is_err(), "expected a sub-second renew interval to be rejected");

    let config = config()?;
    assert!(config.name() == "alpha-lease", "unexpected lease name {}", config.name());
    assert!(config.namespace() == "ledger", "unexpected lease namespace {}", config.namespace());
    assert!(config.identity() == IDENTITY, "unexpected lease identity {}", config.identity());
    Ok(())
}

#[test]
fn next_action_takes_over_absent_or_free_leases() -> Result<()> {
    let now = fixed_now();
    let action = next_action(None, IDENTITY, now);
    assert!(action == LeaseAction::TakeOver, "expected an absent lease to be taken over, got {:?}", action);

    let free = LeaseSpec::default();
    let action = next_action(Some(&free), IDENTITY, now);
    assert!(action == LeaseAction::TakeOver, "expected a lease without holder to be taken over, got {:?}", action);

    let mut released = spec_held_by("bob@laptop", 1);
    released.holder_identity = Some("".into());
    let action = next_action(Some(&released), IDENTITY, now);
    assert!(action == LeaseAction::TakeOver, "expected a released lease to be taken over, got {:?}", action);
    Ok(())
}

#[test]
fn next_action_renews_own_lease() -> Result<()> {
    let now = fixed_now();
    let spec = spec_held_by(IDENTITY, 60);
    let action = next_action(Some(&spec), IDENTITY, now);
    assert!(action == LeaseAction::Renew, "expected our own lease to be renewed even when expired, got {:?}", action);
    Ok(())
}

#[test]
fn next_action_waits_on_live_foreign_lease_and_takes_over_expired_one() -> Result<()> {
    let now = fixed_now();

    let live = spec_held_by("bob@laptop", 5);
    let action = next_action(Some(&live), IDENTITY, now);
    let expected = LeaseAction::Wait {
        holder: "bob@laptop".into(),
        expires_at: now + Duration::seconds(15),
    };
    assert!(action == expected, "expected to wait on a live lease, got {:?}", action);

    let expired = spec_held_by("bob@laptop", 20);
    let action = next_action(Some(&expired), IDENTITY, now);
    assert!(action == LeaseAction::TakeOver, "expected a lease expiring exactly now to be taken over, got {:?}", action);

    let mut never_renewed = spec_held_by("bob@laptop", 0);
    never_renewed.renew_time = None;
    let action = next_action(Some(&never_renewed), IDENTITY, now);
    assert!(action == LeaseAction::TakeOver, "expected a lease acquired long ago and never renewed to be taken over, got {:?}", action);
    Ok(())
}

#[test]
fn other_processes_of_the_same_user_and_host_are_waited_on() -> Result<()> {
    let now = fixed_now();
    let ours = process_identity(IDENTITY);
    assert!(ours == format!("{}#{}", IDENTITY, std::process::id()), "unexpected process identity {}", ours);

    let other = format!("{}#{}", IDENTITY, std::process::id().wrapping_add(1));
    let live = spec_held_by(&other, 5);
    let action = next_action(Some(&live), &ours, now);
    let expected = LeaseAction::Wait {
        holder: other.clone(),
        expires_at: now + Duration::seconds(15),
    };
    assert!(action == expected, "expected to wait on a live lease of another process, got {:?}", action);

    let own = spec_held_by(&ours, 5);
    let action = next_action(Some(&own), &ours, now);
    assert!(action == LeaseAction::Renew, "expected this process's lease to be renewed, got {:?}", action);
    Ok(())
}

#[test]
fn claim_takes_over_and_counts_transitions() -> Result<()> {
    let config = config()?;
    let now = fixed_now();

    let created = claim(None, &config, &LeaseAction::TakeOver, now);
    assert!(created.metadata.name.as_deref() == Some("alpha-lease"), "unexpected lease name {:?}", created.metadata.name);
    assert!(created.metadata.namespace.as_deref() == Some("ledger"), "unexpected lease namespace {:?}", created.metadata.namespace);
    let spec = created.spec.clone().unwrap_or_default();
    assert!(spec.holder_identity.as_deref() == Some(IDENTITY), "unexpected holder {:?}", spec.holder_identity);
    assert!(spec.lease_transitions == Some(0), "expected a new lease to start at 0 transitions, got {:?}", spec.lease_transitions);
    assert!(spec.lease_duration_seconds == Some(20), "unexpected lease duration {:?}", spec.lease_duration_seconds);
    assert!(spec.renew_time == Some(MicroTime(now)), "unexpected renew time {:?}", spec.renew_time);

    let mut observed = created;
    observed.spec = Some(spec_held_by("bob@laptop", 60));
    let taken = claim(Some(&observed), &config, &LeaseAction::TakeOver, now);
    let spec = taken.spec.unwrap_or_default();
    assert!(spec.holder_identity.as_deref() == Some(IDENTITY), "unexpected holder after takeover {:?}", spec.holder_identity);
    assert!(spec.lease_transitions == Some(4), "expected transitions to be incremented, got {:?}", spec.lease_transitions);
    assert!(spec.acquire_time == Some(MicroTime(now)), "unexpected acquire time {:?}", spec.acquire_time);
    Ok(())
}

#[test]
fn claim_renewal_keeps_acquisition() -> Result<()> {
    let config = config()?;
    let now = fixed_now();
    let mut observed = claim(None, &config, &LeaseAction::TakeOver, now - Duration::seconds(30));
    observed.spec = Some(spec_held_by(IDENTITY, 10));
    let acquired_at = observed.spec.as_ref().and_then(|spec| spec.acquire_time.clone());

    let renewed = claim(Some(&observed), &config, &LeaseAction::Renew, now);
    let spec = renewed.spec.unwrap_or_default();
    assert!(spec.acquire_time == acquired_at, "expected renewal to keep the acquire time, got {:?}", spec.acquire_time);
    assert!(spec.lease_transitions == Some(3), "expected renewal to keep transitions, got {:?}", spec.lease_transitions);
    assert!(spec.renew_time == Some(MicroTime(now)), "unexpected renew time {:?}", spec.renew_time);
    Ok(())
}

#[test]
fn lease_validity_window() -> Result<()> {
    let now = fixed_now();
    let duration = Duration::seconds(20);
    let recent = (now - Duration::seconds(19)).timestamp_millis();
    let stale = (now - Duration::seconds(20)).timestamp_millis();
    assert!(is_within_lease(recent, duration, now), "expected a renewal 19s ago to be within a 20s lease");
    assert!(!is_within_lease(stale, duration, now), "expected a renewal 20s ago to have expired");
    assert!(!is_within_lease(0, duration, now), "expected a lease never renewed to be invalid");
    Ok(())
}
