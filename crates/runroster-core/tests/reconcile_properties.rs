use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use runroster_core::{
    CURRENT_RUN_MARKER, DestinationMessage, LookbackWindow, MemoryDestination, MessageHandle,
    MilestoneTracker, Page, PageSet, StatusCard, apply_plan, plan,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap()
}

fn window() -> LookbackWindow {
    LookbackWindow::starting_at(base())
}

fn card(title: String) -> Page {
    Page::Card(StatusCard {
        title,
        description: String::new(),
        fields: Vec::new(),
        footer_timestamp: base(),
    })
}

fn arb_body() -> impl Strategy<Value = String> {
    "[a-c]{1,3}"
}

fn arb_page_set() -> impl Strategy<Value = PageSet> {
    (
        arb_body(),
        prop::collection::vec((arb_body(), any::<bool>()), 0..6),
        "[a-c]{1,2}",
    )
        .prop_map(|(header, bodies, title)| {
            let mut pages = vec![Page::text(header)];
            pages.extend(bodies.into_iter().map(|(body, live)| {
                if live {
                    Page::Text(format!("{CURRENT_RUN_MARKER} {body}"))
                } else {
                    Page::Text(body)
                }
            }));
            pages.push(card(title));
            PageSet::new(pages).unwrap()
        })
}

fn arb_history() -> impl Strategy<Value = Vec<DestinationMessage>> {
    prop::collection::vec(
        (
            prop_oneof![
                arb_body().prop_map(Page::Text),
                "[a-c]{1,2}".prop_map(card),
            ],
            any::<bool>(),
            prop::bool::weighted(0.8),
            -120i64..600,
        ),
        0..8,
    )
    .prop_map(|messages| {
        messages
            .into_iter()
            .enumerate()
            .map(
                |(i, (body, pinned, authored_by_self, minutes))| DestinationMessage {
                    handle: MessageHandle(format!("seed-{i}")),
                    created_at: base() + Duration::minutes(minutes),
                    body,
                    pinned,
                    authored_by_self,
                },
            )
            .collect()
    })
}

fn candidates(messages: &[DestinationMessage]) -> Vec<DestinationMessage> {
    let window = window();
    let mut candidates: Vec<DestinationMessage> = messages
        .iter()
        .filter(|message| message.authored_by_self && window.contains(message.created_at))
        .cloned()
        .collect();
    candidates.sort_by_key(|message| message.created_at);
    candidates
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn applying_a_plan_yields_exactly_the_pages(
        pages in arb_page_set(),
        history in arb_history(),
    ) {
        let destination = MemoryDestination::with_messages("prop", history.clone());
        let first = plan(&pages, &history, &window());
        runtime().block_on(apply_plan(&destination, first)).unwrap();

        let after = destination.messages();
        let matched = candidates(&after);
        prop_assert_eq!(matched.len(), pages.len());
        for (index, message) in matched.iter().enumerate() {
            prop_assert_eq!(&message.body, &pages.pages()[index]);
            prop_assert_eq!(message.pinned, pages.pin_target(index));
        }

        // Foreign and out-of-window messages are never touched.
        let untouched: Vec<&DestinationMessage> = history
            .iter()
            .filter(|message| !message.authored_by_self || !window().contains(message.created_at))
            .collect();
        for original in untouched {
            prop_assert!(after.contains(original));
        }

        let second = plan(&pages, &after, &window());
        prop_assert!(second.is_empty(), "second plan not empty: {:?}", second);
    }

    #[test]
    fn planning_is_deterministic(pages in arb_page_set(), history in arb_history()) {
        prop_assert_eq!(
            plan(&pages, &history, &window()),
            plan(&pages, &history, &window())
        );
    }

    #[test]
    fn milestones_are_announced_once_in_ascending_order(
        mut totals in prop::collection::vec(0.0f64..50_000.0, 1..30),
    ) {
        totals.sort_by(f64::total_cmp);
        let ladder: Vec<f64> = (1..=20).map(|step| f64::from(step) * 2_500.0).collect();
        let mut tracker = MilestoneTracker::new(ladder.clone()).unwrap();

        let baseline = totals[0];
        let mut announced = Vec::new();
        for total in &totals {
            announced.extend(tracker.observe(*total).into_iter().map(|event| event.threshold));
        }

        prop_assert!(announced.windows(2).all(|pair| pair[0] < pair[1]));
        let expected: Vec<f64> = ladder
            .iter()
            .copied()
            .filter(|threshold| *threshold > baseline && *threshold <= totals[totals.len() - 1])
            .collect();
        prop_assert_eq!(announced, expected);
    }
}
