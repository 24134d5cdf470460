use retrochat_core::codes::CodeSource;
use retrochat_core::{ChatError, ErrorKind, RoomConfig, RoomService};
use retrochat_db::Database;
use retrochat_types::models::{Cursor, LeaveOutcome, MembershipStatus, RoomCode, SYSTEM_SENDER};

struct FixedCode(u32);

impl CodeSource for FixedCode {
    fn candidate(&self) -> RoomCode {
        RoomCode::from_number(self.0)
    }
}

fn service() -> RoomService {
    RoomService::new(Database::open_in_memory().unwrap(), RoomConfig::default())
}

#[tokio::test]
async fn arcade_walkthrough() {
    let svc = RoomService::with_code_source(
        Database::open_in_memory().unwrap(),
        RoomConfig::default(),
        FixedCode(48213),
    );

    let room = svc.create_room("Arcade", "Al").await.unwrap();
    assert_eq!(room.code.as_str(), "48213");

    svc.join_room("48213", "Bo").await.unwrap();
    assert_eq!(svc.list_pending_users("48213").await.unwrap(), vec!["Bo"]);

    let notice = svc.approve_user("48213", "Bo").await.unwrap();
    assert_eq!(notice.sender, SYSTEM_SENDER);
    assert_eq!(notice.body, "Bo has joined the chatroom");
    assert!(notice.is_system);
    assert!(svc.list_pending_users("48213").await.unwrap().is_empty());

    svc.send_message("48213", "Bo", "hi").await.unwrap();
    let (log, cursor) = svc
        .fetch_new_messages("48213", Cursor::START, None)
        .await
        .unwrap();
    let lines: Vec<(&str, &str, bool)> = log
        .iter()
        .map(|m| (m.sender.as_str(), m.body.as_str(), m.is_system))
        .collect();
    assert_eq!(
        lines,
        vec![
            (SYSTEM_SENDER, "Bo has joined the chatroom", true),
            ("Bo", "hi", false),
        ]
    );

    let outcome = svc.leave_room("48213", "Al", true).await.unwrap();
    assert!(matches!(outcome, LeaveOutcome::RoomClosed { .. }));

    assert!(svc.room_snapshot("48213").await.unwrap_err().is_room_gone());
    let err = svc.fetch_new_messages("48213", cursor, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(svc.live_rooms().await.unwrap(), 0);
}

#[tokio::test]
async fn code_space_exhaustion_is_reported() {
    let config = RoomConfig {
        code_attempts: 3,
        ..RoomConfig::default()
    };
    let svc = RoomService::with_code_source(Database::open_in_memory().unwrap(), config, FixedCode(7));

    svc.create_room("First", "Al").await.unwrap();
    let err = svc.create_room("Second", "Cy").await.unwrap_err();
    assert!(matches!(err, ChatError::CapacityExhausted { attempts: 3 }));
    assert_eq!(err.kind(), ErrorKind::CapacityExhausted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approve_and_reject_race_has_one_winner() {
    let svc = service();
    let room = svc.create_room("Arcade", "Al").await.unwrap();
    let code = room.code.as_str().to_string();

    for round in 0..20 {
        let name = format!("guest{round}");
        svc.join_room(&code, &name).await.unwrap();

        let (a, b) = (svc.clone(), svc.clone());
        let (c1, c2) = (code.clone(), code.clone());
        let (n1, n2) = (name.clone(), name.clone());
        let approve = tokio::spawn(async move { a.approve_user(&c1, &n1).await.map(|_| ()) });
        let reject = tokio::spawn(async move { b.reject_user(&c2, &n2).await });

        let results = [approve.await.unwrap(), reject.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "round {round}: {results:?}");
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, ChatError::NoSuchPendingRequest { .. }), "{e}");
            }
        }
        assert!(svc.list_pending_users(&code).await.unwrap().is_empty());
    }

    // Every approved guest left exactly one notice
    let (log, _) = svc.fetch_new_messages(&code, Cursor::START, None).await.unwrap();
    let members = svc.room_snapshot(&code).await.unwrap().members.len();
    assert_eq!(log.len(), members);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_get_distinct_ordered_seqs() {
    let svc = service();
    let room = svc.create_room("Arcade", "Al").await.unwrap();
    let code = room.code.as_str().to_string();

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let svc = svc.clone();
            let code = code.clone();
            tokio::spawn(async move { svc.send_message(&code, "Al", &format!("line {i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let (log, cursor) = svc.fetch_new_messages(&code, Cursor::START, None).await.unwrap();
    let seqs: Vec<u64> = log.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, (1..=50).collect::<Vec<_>>());
    assert_eq!(cursor, Cursor(50));
}

#[tokio::test]
async fn guest_leave_writes_one_notice_and_keeps_the_room() {
    let svc = service();
    let room = svc.create_room("Arcade", "Al").await.unwrap();
    let code = room.code.as_str();
    svc.join_room(code, "Bo").await.unwrap();
    svc.approve_user(code, "Bo").await.unwrap();
    assert!(svc.is_member(code, "Bo").await.unwrap());

    let outcome = svc.leave_room(code, "Bo", false).await.unwrap();
    match outcome {
        LeaveOutcome::MemberLeft { farewell } => {
            assert_eq!(farewell.body, "Bo has left the chatroom");
            assert!(farewell.is_system);
        }
        other => panic!("unexpected {other:?}"),
    }

    // A second leave is a no-op, not a second notice
    assert_eq!(
        svc.leave_room(code, "Bo", false).await.unwrap(),
        LeaveOutcome::NotInRoom
    );
    let (log, _) = svc.fetch_new_messages(code, Cursor(1), None).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(!svc.is_member(code, "Bo").await.unwrap());

    assert_eq!(
        svc.membership_status(code, "Bo").await.unwrap(),
        MembershipStatus::Absent
    );
    assert_eq!(
        svc.membership_status(code, "Al").await.unwrap(),
        MembershipStatus::Host
    );
}

#[tokio::test]
async fn non_members_cannot_post() {
    let svc = service();
    let room = svc.create_room("Arcade", "Al").await.unwrap();
    let code = room.code.as_str();
    svc.join_room(code, "Bo").await.unwrap();

    let err = svc.send_message(code, "Bo", "let me in").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn duplicate_names_in_one_room_are_refused() {
    let svc = service();
    let room = svc.create_room("Arcade", "Al").await.unwrap();
    let code = room.code.as_str();

    assert!(matches!(
        svc.join_room(code, "al").await,
        Err(ChatError::UsernameTaken { .. })
    ));
    svc.join_room(code, "Bo").await.unwrap();
    assert!(matches!(
        svc.join_room(code, "BO").await,
        Err(ChatError::AlreadyPending { .. })
    ));
}

#[tokio::test]
async fn rooms_are_isolated() {
    let svc = service();
    let a = svc.create_room("A", "Al").await.unwrap();
    let b = svc.create_room("B", "Cy").await.unwrap();

    svc.send_message(a.code.as_str(), "Al", "in a").await.unwrap();
    svc.leave_room(b.code.as_str(), "Cy", true).await.unwrap();

    let (log, _) = svc
        .fetch_new_messages(a.code.as_str(), Cursor::START, None)
        .await
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(svc.live_rooms().await.unwrap(), 1);
}

#[tokio::test]
async fn catch_up_read_returns_the_whole_backlog() {
    let svc = service();
    let room = svc.create_room("Arcade", "Al").await.unwrap();
    let code = room.code.as_str();

    let total = retrochat_db::messages::MAX_PAGE as u64 + 1;
    for i in 0..total {
        svc.send_message(code, "Al", &format!("line {i}")).await.unwrap();
    }

    let (log, cursor) = svc.fetch_new_messages(code, Cursor::START, None).await.unwrap();
    assert_eq!(log.len() as u64, total);
    assert_eq!(cursor, Cursor(total));
}
