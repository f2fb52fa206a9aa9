//! Sync properties across storage engines.

use proptest::prelude::*;

use costore_core::{ErrorClass, KnownState};
use costore_store::Store;
use costore_sync::{co_value_state_hash, verify_convergence, SyncConfig, SyncMessage};
use costore_testkit::{
    memory_store, multi_party_writers, numbered_transaction, sqlite_store, SyncLink, TestWriter,
};

fn content_messages(msgs: &[SyncMessage]) -> Vec<&costore_sync::NewContentMessage> {
    msgs.iter()
        .filter_map(|m| match m {
            SyncMessage::Content(c) => Some(c),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_round_trip_sqlite_to_memory() -> anyhow::Result<()> {
    let writer = TestWriter::with_seed([1; 32]);
    let new = writer.co_value(0);
    let (s1, s2) = (writer.session(1), writer.session(2));

    let source = sqlite_store()?;
    source
        .add_co_value(&new.clone().with_content(vec![
            writer.session_content(&new.id, s1, 4),
            writer.session_content(&new.id, s2, 2),
        ]))
        .await?;

    let mut link = SyncLink::new(source, memory_store());
    link.b.manager.load(&new.id).await?;
    let stats = link.pump(8).await;
    assert!(stats.errors.is_empty(), "{:?}", stats.errors);

    let b = &link.b.store;
    assert_eq!(b.get_co_value(&new.id).await?, Some(new.header.clone()));
    assert_eq!(
        b.get_transactions(&new.id, &s1, 0, 3).await?,
        (0..4).map(numbered_transaction).collect::<Vec<_>>()
    );
    assert_eq!(b.get_sessions(&new.id).await?, link.a.store.get_sessions(&new.id).await?);

    let remote_hash = co_value_state_hash(&*link.a.store, &new.id).await?;
    let remote_known = link.a.store.known_state(&new.id).await?;
    assert!(verify_convergence(&**b, &new.id, &remote_known, remote_hash.as_ref())
        .await?
        .is_converged());
    Ok(())
}

#[tokio::test]
async fn test_only_missing_suffix_is_sent() -> anyhow::Result<()> {
    let writer = TestWriter::with_seed([2; 32]);
    let new = writer.co_value(1);
    let (s1, s2) = (writer.session(1), writer.session(2));

    let mut link = SyncLink::new(memory_store(), memory_store());
    for store in [&link.a.store, &link.b.store] {
        store
            .add_co_value(&new.clone().with_content(vec![
                writer.session_content(&new.id, s1, 3),
                writer.session_content(&new.id, s2, 5),
            ]))
            .await?;
    }
    writer.append(&*link.a.store, &new.id, s1, 2).await?;

    link.b.manager.load(&new.id).await?;
    let stats = link.pump(8).await;
    assert!(stats.errors.is_empty());

    let sent = content_messages(&stats.a_to_b);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].header.is_none());
    assert_eq!(sent[0].new.len(), 1);
    assert_eq!(sent[0].new[0].session_id, s1);
    assert_eq!(sent[0].new[0].after, 3);
    assert_eq!(sent[0].transaction_count(), 2);
    assert!(content_messages(&stats.b_to_a).is_empty());

    assert_eq!(link.b.store.known_state(&new.id).await?.count(&s1), 5);
    Ok(())
}

#[tokio::test]
async fn test_multi_writer_convergence() -> anyhow::Result<()> {
    let writers = multi_party_writers(3);
    let new = writers[0].co_value(2);

    let mut link = SyncLink::new(sqlite_store()?, memory_store());
    link.a.store.add_co_value(&new).await?;
    link.b.store.add_co_value(&new).await?;

    // Writers 0 and 1 write on replica A, writer 2 on replica B.
    writers[0].append(&*link.a.store, &new.id, writers[0].session(0), 3).await?;
    writers[1].append(&*link.a.store, &new.id, writers[1].session(0), 1).await?;
    writers[2].append(&*link.b.store, &new.id, writers[2].session(0), 4).await?;

    link.a.manager.load(&new.id).await?;
    link.b.manager.load(&new.id).await?;
    let stats = link.pump(8).await;
    assert!(stats.errors.is_empty(), "{:?}", stats.errors);

    let known_a = link.a.store.known_state(&new.id).await?;
    assert_eq!(known_a, link.b.store.known_state(&new.id).await?);
    assert_eq!(known_a.sessions.len(), 3);
    assert_eq!(
        co_value_state_hash(&*link.a.store, &new.id).await?,
        co_value_state_hash(&*link.b.store, &new.id).await?
    );
    Ok(())
}

#[tokio::test]
async fn test_large_sessions_are_packed_by_limit() -> anyhow::Result<()> {
    let writer = TestWriter::with_seed([3; 32]);
    let new = writer.co_value(3);
    let sessions: Vec<_> = (0..3).map(|n| writer.session(n)).collect();

    let mut link = SyncLink::new(memory_store(), memory_store());
    link.a
        .store
        .add_co_value(
            &new.clone().with_content(
                sessions
                    .iter()
                    .map(|s| writer.session_content(&new.id, *s, 60))
                    .collect(),
            ),
        )
        .await?;

    link.b.manager.load(&new.id).await?;
    let stats = link.pump(8).await;
    assert!(stats.errors.is_empty());

    let sent = content_messages(&stats.a_to_b);
    assert_eq!(sent.len(), 3);
    assert!(sent[0].header.is_some());
    assert!(sent[1..].iter().all(|m| m.header.is_none()));
    assert!(sent.iter().all(|m| m.transaction_count() == 60));
    assert_eq!(link.b.store.known_state(&new.id).await?.sessions.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_tampered_content_never_lands() -> anyhow::Result<()> {
    let writer = TestWriter::with_seed([4; 32]);
    let new = writer.co_value(4);
    let session = writer.session(0);

    let mut content = writer.session_content(&new.id, session, 3);
    content.transactions[1] = numbered_transaction(99);

    let mut link = SyncLink::new(memory_store(), memory_store());
    link.a
        .store
        .add_co_value(&new.clone().with_content(vec![content]))
        .await?;

    link.b.manager.load(&new.id).await?;
    let stats = link.pump(8).await;

    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].class(), ErrorClass::Integrity);
    // The header arrived in the same message, so nothing was stored.
    assert_eq!(link.b.store.get_co_value(&new.id).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_gap_is_answered_with_corrective_known() -> anyhow::Result<()> {
    let writer = TestWriter::with_seed([5; 32]);
    let new = writer.co_value(5);
    let session = writer.session(0);

    let mut link = SyncLink::new(memory_store(), memory_store());
    link.a
        .store
        .add_co_value(&new.clone().with_content(vec![writer.session_content(&new.id, session, 6)]))
        .await?;
    link.b
        .store
        .add_co_value(&new.clone().with_content(vec![writer.session_content(&new.id, session, 2)]))
        .await?;

    // A believes B already has 4 transactions and sends from there.
    let mut claimed = KnownState::header_only(new.id);
    claimed.set(session, 4);
    link.a.manager.send_new_content(&claimed).await?;

    let stats = link.pump(8).await;
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].class(), ErrorClass::Protocol);
    assert!(matches!(&stats.b_to_a[0], SyncMessage::Known(k) if k.count(&session) == 2));

    // The corrective Known made A resend from the right offset.
    assert_eq!(link.b.store.known_state(&new.id).await?.count(&session), 6);
    Ok(())
}

#[test]
fn test_sync_fills_any_gap() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    proptest!(ProptestConfig::with_cases(32), |(total in 1u64..40, held in 0u64..40)| {
        let held = held.min(total);
        runtime.block_on(async {
            let writer = TestWriter::with_seed([6; 32]);
            let new = writer.co_value(6);
            let session = writer.session(0);

            let mut link = SyncLink::new(memory_store(), memory_store());
            link.a.store.add_co_value(&new.clone().with_content(vec![
                writer.session_content(&new.id, session, total),
            ])).await.unwrap();
            link.b.store.add_co_value(&new).await.unwrap();
            if held > 0 {
                writer.append(&*link.b.store, &new.id, session, held).await.unwrap();
            }

            link.b.manager.load(&new.id).await.unwrap();
            let stats = link.pump(8).await;
            assert!(stats.errors.is_empty());

            let sent: usize = content_messages(&stats.a_to_b)
                .iter()
                .map(|m| m.transaction_count())
                .sum();
            assert_eq!(sent as u64, total - held);
            assert_eq!(
                link.b.store.get_sessions(&new.id).await.unwrap(),
                link.a.store.get_sessions(&new.id).await.unwrap()
            );
        });
    });
}

#[tokio::test]
async fn test_unverified_config_still_orders() -> anyhow::Result<()> {
    let writer = TestWriter::with_seed([7; 32]);
    let new = writer.co_value(7);
    let config = SyncConfig {
        verify_signatures: false,
        ..SyncConfig::default()
    };

    let mut link = SyncLink::with_config(memory_store(), memory_store(), config);
    link.a
        .store
        .add_co_value(&new.clone().with_content(vec![writer.session_content(
            &new.id,
            writer.session(0),
            3,
        )]))
        .await?;
    link.b.manager.load(&new.id).await?;
    let stats = link.pump(8).await;
    assert!(stats.errors.is_empty());
    assert_eq!(
        link.b.store.get_sessions(&new.id).await?,
        link.a.store.get_sessions(&new.id).await?
    );
    Ok(())
}
