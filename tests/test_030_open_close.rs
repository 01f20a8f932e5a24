mod test_utils;

use adacall::StoreRequest;
use log::{debug, info};

// cargo test --test test_030_open_close -- --nocapture
#[test]
fn test_030_open_close() {
    let mut _log_handle = test_utils::init_logger();

    let mut rig = test_utils::rig(
        24,
        test_utils::admin_then(|call| {
            match &call.control_block.command {
                b"N1" => {
                    call.control_block.response = 0;
                    call.control_block.isn = 777;
                }
                other => panic!("unexpected command {:?}", String::from_utf8_lossy(other)),
            }
            Ok(())
        }),
    );

    info!("explicit open sets flag, version and platform");
    let status = rig.session.status().unwrap();
    assert!(!status.open);
    rig.session.open().unwrap();
    let status = rig.session.status().unwrap();
    assert!(status.open);
    assert_eq!(status.pending_transactions, 0);
    assert_eq!(status.version.as_deref(), Some("7.1.2.3"));
    assert_eq!(rig.commands(), vec!["OP"]);

    debug!("open is idempotent");
    rig.session.open().unwrap();
    assert_eq!(rig.call_count("OP"), 1);

    info!("a cloned session shares the open state");
    let clone = rig.session.clone_session();
    assert!(clone.status().unwrap().open);

    info!("a store leaves a pending transaction behind");
    let isn = rig
        .session
        .store(
            11,
            &StoreRequest {
                isn: 0,
                format: b"AA,8,B.".to_vec(),
                record: vec![1; 8],
                exchange: false,
            },
        )
        .unwrap();
    assert_eq!(isn, 777);
    assert_eq!(rig.session.status().unwrap().pending_transactions, 1);
    assert_eq!(clone.status().unwrap().pending_transactions, 1);

    info!("close backs the pending transaction out before the close call");
    rig.session.close().unwrap();
    assert_eq!(rig.commands(), vec!["OP", "N1", "BT", "CL"]);
    let status = rig.session.status().unwrap();
    assert!(!status.open);
    assert_eq!(status.pending_transactions, 0);

    debug!("closing again is a no-op");
    rig.session.close().unwrap();
    assert_eq!(rig.call_count("CL"), 1);
}

#[test]
fn test_031_implicit_open() {
    let mut rig = test_utils::rig(
        24,
        test_utils::admin_then(|call| {
            call.control_block.response = 0;
            call.control_block.isn = 5;
            Ok(())
        }),
    );

    // the first data command opens the session on its own
    rig.session
        .store(
            11,
            &StoreRequest {
                isn: 0,
                format: b"AA,8,B.".to_vec(),
                record: vec![0; 8],
                exchange: false,
            },
        )
        .unwrap();
    assert_eq!(rig.commands(), vec!["OP", "N1"]);
    assert!(rig.session.status().unwrap().open);
}

#[test]
fn test_032_close_without_transactions_skips_backout() {
    let mut rig = test_utils::rig(24, test_utils::admin_then(|_| Ok(())));
    rig.session.open().unwrap();
    rig.session.close().unwrap();
    assert_eq!(rig.commands(), vec!["OP", "CL"]);
}
