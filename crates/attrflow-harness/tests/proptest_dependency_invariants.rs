#![forbid(unsafe_code)]

//! Property tests: random write sequences against a mixed session.
//!
//! After every write:
//!
//! 1. the reverse index matches every recorded dependency set
//! 2. every derived value equals a from-scratch computation of the model
//! 3. a derived attribute was notified exactly when its value changed

use attrflow_core::{InstanceId, Value};
use attrflow_harness::ChangeLog;
use attrflow_harness::fixtures::{plus_kind, user_kind};
use attrflow_runtime::{Kind, Session, SessionStats};
use proptest::prelude::*;

const NAMES: [&str; 4] = ["Amy", "Bo", "Hunter", ""];
const CHAIN: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    SetBase(i64),
    SetDelta(usize, i64),
    /// Point chain link `link` at `target`: 0 is the base, `k` is link `k - 1`.
    Repoint(usize, usize),
    SetName { first: bool, name: usize },
    UnsetLast,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-50i64..50).prop_map(Op::SetBase),
        (0..CHAIN, -5i64..5).prop_map(|(i, d)| Op::SetDelta(i, d)),
        (0..CHAIN)
            .prop_flat_map(|link| (Just(link), 0..=link))
            .prop_map(|(link, target)| Op::Repoint(link, target)),
        (any::<bool>(), 0..NAMES.len()).prop_map(|(first, name)| Op::SetName { first, name }),
        Just(Op::UnsetLast),
    ]
}

/// Plain-attribute mirror of the session, used to compute expected values.
#[derive(Debug, Clone)]
struct Model {
    base: i64,
    deltas: [i64; CHAIN],
    targets: [usize; CHAIN],
    first: String,
    last: Option<String>,
}

impl Model {
    fn chain_val(&self, link: usize) -> i64 {
        let upstream = match self.targets[link] {
            0 => self.base,
            k => self.chain_val(k - 1),
        };
        upstream + self.deltas[link]
    }

    fn full_name(&self) -> String {
        format!("{} {}", self.first, self.last.as_deref().unwrap_or("null"))
    }
}

struct Fixture {
    session: Session,
    base: InstanceId,
    links: Vec<InstanceId>,
    user: InstanceId,
    logs: Vec<ChangeLog>,
    name_log: ChangeLog,
}

fn fixture() -> (Fixture, Model) {
    let mut session = Session::new();
    let base = session
        .create(&Kind::plain(), [("val", 0)])
        .expect("create base");
    let plus = plus_kind();
    let mut links = Vec::new();
    let mut logs = Vec::new();
    for link in 0..CHAIN {
        let upstream = if link == 0 { base } else { links[link - 1] };
        let id = session
            .create(&plus, [("reference", Value::from(upstream))])
            .expect("create link");
        let log = ChangeLog::new();
        session.subscribe(id, "val", log.handler()).expect("subscribe");
        links.push(id);
        logs.push(log);
    }
    let user = session
        .create(&user_kind(), [("first_name", "Amy"), ("last_name", "Lynn")])
        .expect("create user");
    let name_log = ChangeLog::new();
    session
        .subscribe(user, "full_name", name_log.handler())
        .expect("subscribe");

    let model = Model {
        base: 0,
        deltas: [1; CHAIN],
        targets: std::array::from_fn(|link| link),
        first: "Amy".to_string(),
        last: Some("Lynn".to_string()),
    };
    (
        Fixture {
            session,
            base,
            links,
            user,
            logs,
            name_log,
        },
        model,
    )
}

fn apply(fx: &mut Fixture, model: &mut Model, op: &Op) {
    let session = &mut fx.session;
    let report = match *op {
        Op::SetBase(v) => {
            model.base = v;
            session.set(fx.base, "val", v)
        }
        Op::SetDelta(link, d) => {
            model.deltas[link] = d;
            session.set(fx.links[link], "delta", d)
        }
        Op::Repoint(link, target) => {
            model.targets[link] = target;
            let upstream = if target == 0 {
                fx.base
            } else {
                fx.links[target - 1]
            };
            session.set(fx.links[link], "reference", Value::from(upstream))
        }
        Op::SetName { first, name } => {
            let name = NAMES[name];
            if first {
                model.first = name.to_string();
                session.set(fx.user, "first_name", name)
            } else {
                model.last = Some(name.to_string());
                session.set(fx.user, "last_name", name)
            }
        }
        Op::UnsetLast => {
            model.last = None;
            session.unset(fx.user, "last_name")
        }
    }
    .expect("write");
    assert!(!report.has_failures(), "{report:?}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn random_writes_keep_values_index_and_notifications_consistent(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let (mut fx, mut model) = fixture();
        for op in &ops {
            let before: Vec<i64> = (0..CHAIN).map(|l| model.chain_val(l)).collect();
            let name_before = model.full_name();
            let counts: Vec<usize> = fx.logs.iter().map(ChangeLog::len).collect();
            let name_count = fx.name_log.len();

            apply(&mut fx, &mut model, op);

            let audit = fx.session.audit();
            prop_assert!(audit.is_empty(), "{:?} after {:?}", audit, op);

            for link in 0..CHAIN {
                let expected = model.chain_val(link);
                let got = fx.session.get(fx.links[link], "val").expect("get");
                prop_assert_eq!(got, Some(Value::Int(expected)));
                let notified = fx.logs[link].len() - counts[link];
                prop_assert_eq!(notified, usize::from(expected != before[link]));
            }

            let got = fx.session.get(fx.user, "full_name").expect("get");
            prop_assert_eq!(got, Some(Value::str(&model.full_name())));
            let notified = fx.name_log.len() - name_count;
            prop_assert_eq!(notified, usize::from(model.full_name() != name_before));
        }
    }

    #[test]
    fn destroy_in_any_order_leaves_nothing_behind(
        order in Just((0..=CHAIN).collect::<Vec<usize>>()).prop_shuffle()
    ) {
        let (mut fx, _) = fixture();
        for slot in order {
            let id = if slot == 0 { fx.base } else { fx.links[slot - 1] };
            let report = fx.session.destroy(id).expect("destroy");
            prop_assert!(!report.has_failures());
            let audit = fx.session.audit();
            prop_assert!(audit.is_empty(), "{:?}", audit);
        }
        fx.session.destroy(fx.user).expect("destroy");
        prop_assert_eq!(fx.session.stats(), SessionStats::default());
    }
}
