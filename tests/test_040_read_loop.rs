mod test_utils;

use adacall::{Cursor, FetchFlow, FetchRequest, ReadOp};
use log::info;
use std::sync::{Arc, Mutex};
use test_utils::TestDefinition;

const TOTAL: u64 = 23;

/// A rig whose server holds records with ISNs 1..=TOTAL and answers
/// physical reads batch-wise; every requested batch size is recorded.
fn physical_rig() -> (test_utils::TestRig, Arc<Mutex<Vec<u64>>>) {
    let position = Arc::new(Mutex::new(1_u64));
    let batches: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let batches_in_script = batches.clone();
    let rig = test_utils::rig(
        24,
        test_utils::admin_then(move |call| {
            assert_eq!(&call.control_block.command, b"L2");
            let mut position = position.lock().unwrap();
            let batch = call.control_block.isn_lower_limit.max(1);
            batches_in_script.lock().unwrap().push(batch);
            if *position > TOTAL {
                call.control_block.response = 3;
                return Ok(());
            }
            let end = (*position + batch - 1).min(TOTAL);
            let isns: Vec<u64> = (*position..=end).collect();
            *position = end + 1;
            test_utils::provide_records(call, &isns);
            Ok(())
        }),
    );
    (rig, batches)
}

// cargo test --test test_040_read_loop -- --nocapture
#[test]
fn test_040_limit_shrinks_the_last_batch() {
    let mut _log_handle = test_utils::init_logger();
    let (mut rig, batches) = physical_rig();

    info!("read 12 records with multifetch 5");
    let mut definition = TestDefinition::default();
    let mut request = FetchRequest::new(&mut definition);
    request.limit = 12;
    request.multifetch = 5;
    let mut isns = Vec::new();
    let fetched = rig
        .session
        .read_physical(11, &mut request, &mut |info| {
            isns.push(info.isn);
            Ok(FetchFlow::Continue)
        })
        .unwrap();

    assert_eq!(fetched, 12);
    assert_eq!(isns, (1..=12).collect::<Vec<u64>>());
    // the last call only asks for the remaining two records
    assert_eq!(*batches.lock().unwrap(), vec![5, 5, 2]);
    // the parsed payloads arrived in the definition
    assert_eq!(definition.values, (1..=12).map(|i| i * 10).collect::<Vec<u64>>());
}

#[test]
fn test_041_eof_ends_the_loop_cleanly() {
    let (mut rig, batches) = physical_rig();

    let mut definition = TestDefinition::default();
    let mut request = FetchRequest::new(&mut definition);
    request.multifetch = 5;
    let fetched = rig
        .session
        .read_physical(11, &mut request, &mut |_| Ok(FetchFlow::Continue))
        .unwrap();

    assert_eq!(fetched, TOTAL);
    // five data calls plus the call that ran into end of file
    assert_eq!(batches.lock().unwrap().len(), 6);
    assert_eq!(definition.values.len(), TOTAL as usize);
}

#[test]
fn test_042_callback_stops_the_loop() {
    let (mut rig, _) = physical_rig();

    let mut definition = TestDefinition::default();
    let mut request = FetchRequest::new(&mut definition);
    request.multifetch = 5;
    let fetched = rig
        .session
        .read_physical(11, &mut request, &mut |info| {
            Ok(if info.count >= 3 {
                FetchFlow::Stop
            } else {
                FetchFlow::Continue
            })
        })
        .unwrap();
    assert_eq!(fetched, 3);
}

#[test]
fn test_043_cursor_continues_across_batches() {
    let (mut rig, _) = physical_rig();

    let mut definition = TestDefinition::default();
    let mut request = FetchRequest::new(&mut definition);
    request.multifetch = 5;
    let mut cursor = Cursor::new(ReadOp::Physical, 11, 10);
    let mut isns = Vec::new();

    let mut rounds = 0;
    loop {
        let more = cursor
            .next_batch(&mut rig.session, &mut request, &mut |info| {
                isns.push(info.isn);
                Ok(FetchFlow::Continue)
            })
            .unwrap();
        rounds += 1;
        if !more {
            break;
        }
        assert!(rounds < 10, "cursor did not terminate");
    }

    assert_eq!(isns, (1..=TOTAL).collect::<Vec<u64>>());
    assert!(cursor.is_exhausted());
    // exhausted cursors answer without a call
    let calls_before = rig.commands().len();
    assert!(
        !cursor
            .next_batch(&mut rig.session, &mut request, &mut |_| Ok(
                FetchFlow::Continue
            ))
            .unwrap()
    );
    assert_eq!(rig.commands().len(), calls_before);
}

#[test]
fn test_044_isn_sequence_advances_the_isn() {
    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_script = seen.clone();
    let mut rig = test_utils::rig(
        24,
        test_utils::admin_then(move |call| {
            assert_eq!(&call.control_block.command, b"L1");
            assert_eq!(call.control_block.options[1], b'I');
            let isn = call.control_block.isn;
            seen_in_script.lock().unwrap().push(isn);
            if isn > 8 {
                call.control_block.response = 3;
            } else {
                test_utils::provide_records(call, &[isn]);
            }
            Ok(())
        }),
    );

    let mut definition = TestDefinition::default();
    let mut request = FetchRequest::new(&mut definition);
    let mut isns = Vec::new();
    let fetched = rig
        .session
        .read_isn_sequence(11, 5, &mut request, &mut |info| {
            isns.push(info.isn);
            Ok(FetchFlow::Continue)
        })
        .unwrap();

    assert_eq!(fetched, 4);
    assert_eq!(isns, vec![5, 6, 7, 8]);
    // each call continued one past the previously returned record
    assert_eq!(*seen.lock().unwrap(), vec![5, 6, 7, 8, 9]);
}

#[test]
fn test_045_read_isn_fetches_exactly_one() {
    let mut rig = test_utils::rig(
        24,
        test_utils::admin_then(|call| {
            assert_eq!(&call.control_block.command, b"L1");
            // single-record reads carry the no-continuation sentinel
            assert_eq!(call.control_block.command_id, [0xff; 4]);
            let isn = call.control_block.isn;
            test_utils::provide_records(call, &[isn]);
            Ok(())
        }),
    );

    let mut definition = TestDefinition::default();
    let mut request = FetchRequest::new(&mut definition);
    let fetched = rig
        .session
        .read_isn(11, 42, &mut request, &mut |info| {
            assert_eq!(info.isn, 42);
            Ok(FetchFlow::Continue)
        })
        .unwrap();
    assert_eq!(fetched, 1);
    assert_eq!(rig.commands(), vec!["OP", "L1"]);
}
