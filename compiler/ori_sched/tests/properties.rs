//! Property-based tests for the scheduler.
//!
//! Random floating dataflow (values, guards, memory reads) is attached to
//! fixed writes, clobbers and sinks in one of five control-flow shapes:
//! straight line, diamond, a single loop whose header merges `F1` memory
//! and whose exit proxies every value it uses, a call with normal and
//! exceptional successors, and two nested loops. For every strategy the
//! generated graph must
//! 1. schedule and pass the verifier,
//! 2. schedule identically twice,
//! 3. schedule identically after its dead nodes are deleted.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::doc_markdown,
    clippy::uninlined_format_args,
    reason = "Proptest macros generate code with these patterns"
)]

use ori_sched::{verify_schedule, ScheduleConfig, SchedulePhase, SchedulingStrategy};
use ori_son::{
    CfgBuilder, ControlFlowGraph, ControlKind, Graph, GuardPriority, LocationIdentity,
    MemoryKill, Node, NodeId,
};
use proptest::prelude::*;
use rustc_hash::FxHashMap;

const F1: LocationIdentity = LocationIdentity::Field(1);
const F2: LocationIdentity = LocationIdentity::Field(2);

// -- Program Description --

#[derive(Clone, Copy, Debug)]
enum Shape {
    Straight,
    Diamond,
    Loop,
    Call,
    NestedLoop,
}

impl Shape {
    const ALL: [Shape; 5] = [
        Shape::Straight,
        Shape::Diamond,
        Shape::Loop,
        Shape::Call,
        Shape::NestedLoop,
    ];

    fn block_count(self) -> usize {
        match self {
            Shape::Straight => 1,
            Shape::Call => 3,
            Shape::Diamond | Shape::Loop => 4,
            Shape::NestedLoop => 7,
        }
    }
}

/// A floating node. Input indices are taken modulo the pool built so far.
#[derive(Clone, Debug)]
enum Floating {
    Value(Vec<usize>),
    Read(u8, usize),
    /// A read of `F1` observing the loop header's memory (the start state
    /// outside the `Loop` shape).
    LoopRead(usize),
    Guard(u8, Vec<usize>),
}

/// A fixed node placed in block `slot % block_count`.
#[derive(Clone, Debug)]
enum Fixed {
    Write(u8, usize),
    Sink(Vec<usize>),
    /// Kills `F1` and `F2` (even code) or everything (odd code).
    Clobber(u8),
}

#[derive(Clone, Debug)]
struct Program {
    shape: Shape,
    constants: usize,
    floating: Vec<Floating>,
    fixed: Vec<(usize, Fixed)>,
}

fn location(code: u8) -> LocationIdentity {
    match code % 3 {
        0 => F1,
        1 => F2,
        _ => LocationIdentity::Immutable,
    }
}

fn priority(code: u8) -> GuardPriority {
    match code % 3 {
        0 => GuardPriority::Speculation,
        1 => GuardPriority::Profile,
        _ => GuardPriority::Normal,
    }
}

fn clobber(code: u8) -> Node {
    let kill = if code % 2 == 0 {
        MemoryKill::Multi([F1, F2].into_iter().collect())
    } else {
        MemoryKill::Single(LocationIdentity::Any)
    };
    Node::fixed(ControlKind::Plain, "Clobber").with_kill(kill)
}

// -- Strategies --

fn inputs_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..64, 0..=3)
}

fn floating_strategy() -> impl Strategy<Value = Floating> {
    prop_oneof![
        3 => inputs_strategy().prop_map(Floating::Value),
        2 => (any::<u8>(), 0usize..64).prop_map(|(loc, base)| Floating::Read(loc, base)),
        2 => (0usize..64).prop_map(Floating::LoopRead),
        1 => (any::<u8>(), inputs_strategy()).prop_map(|(p, inputs)| Floating::Guard(p, inputs)),
    ]
}

fn fixed_strategy() -> impl Strategy<Value = (usize, Fixed)> {
    (
        0usize..7,
        prop_oneof![
            3 => (any::<u8>(), 0usize..64).prop_map(|(loc, value)| Fixed::Write(loc, value)),
            3 => prop::collection::vec(0usize..64, 1..=3).prop_map(Fixed::Sink),
            1 => any::<u8>().prop_map(Fixed::Clobber),
        ],
    )
}

fn program_strategy() -> impl Strategy<Value = Program> {
    (
        prop::sample::select(Shape::ALL.to_vec()),
        1usize..=3,
        prop::collection::vec(floating_strategy(), 0..16),
        prop::collection::vec(fixed_strategy(), 0..8),
    )
        .prop_map(|(shape, constants, floating, fixed)| Program {
            shape,
            constants,
            floating,
            fixed,
        })
}

// -- Graph Construction --

fn pick(pool: &[NodeId], indices: &[usize]) -> Vec<NodeId> {
    indices.iter().map(|&i| pool[i % pool.len()]).collect()
}

/// Loop header, its `F1` memory phi, and the loop exit of the `Loop` shape.
struct LoopNodes {
    header: NodeId,
    memory: NodeId,
    exit: NodeId,
}

fn build(program: &Program) -> (Graph, ControlFlowGraph) {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let loop_nodes = matches!(program.shape, Shape::Loop).then(|| {
        let header = graph.add(Node::loop_begin());
        let memory = graph.add(Node::memory_phi(header, F1, [start]));
        let exit = graph.add(Node::loop_exit());
        LoopNodes {
            header,
            memory,
            exit,
        }
    });

    let mut pool: Vec<NodeId> = (0..program.constants)
        .map(|_| graph.add(Node::constant("k")))
        .collect();
    // Whether each pool value depends on the loop header's memory.
    let mut in_loop = vec![false; pool.len()];
    for floating in &program.floating {
        let variant = |indices: &[usize]| indices.iter().any(|&i| in_loop[i % in_loop.len()]);
        let (node, variant) = match floating {
            Floating::Value(inputs) => {
                (Node::value("v", pick(&pool, inputs)), variant(inputs.as_slice()))
            }
            Floating::Read(loc, base) => {
                // Reads of the start state stay ahead of the loop.
                let base = if variant(&[*base]) { 0 } else { *base };
                let node = Node::read(location(*loc), pool[base % pool.len()], Some(start), []);
                (node, false)
            }
            Floating::LoopRead(base) => {
                let memory = loop_nodes.as_ref().map_or(start, |l| l.memory);
                let node = Node::read(F1, pool[base % pool.len()], Some(memory), []);
                (node, loop_nodes.is_some())
            }
            Floating::Guard(p, inputs) => {
                (Node::guard(priority(*p), pick(&pool, inputs)), variant(inputs.as_slice()))
            }
        };
        pool.push(graph.add(node));
        in_loop.push(variant);
    }

    // Values used after the loop leave it through a proxy.
    let mut proxies: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut exit_value = |graph: &mut Graph, value: NodeId| match &loop_nodes {
        Some(l) => *proxies
            .entry(value)
            .or_insert_with(|| graph.add(Node::proxy(l.exit, value))),
        None => value,
    };

    let block_count = program.shape.block_count();
    let exit_slot = 3;
    let mut items: Vec<Vec<NodeId>> = vec![Vec::new(); block_count];
    for (slot, fixed) in &program.fixed {
        let slot = slot % block_count;
        // Loop values do not exist ahead of the loop.
        let before_loop = loop_nodes.is_some() && slot == 0;
        let mut values = |graph: &mut Graph, indices: &[usize]| -> Vec<NodeId> {
            indices
                .iter()
                .map(|&i| {
                    let i = i % pool.len();
                    let value = if before_loop && in_loop[i] { pool[0] } else { pool[i] };
                    if slot == exit_slot {
                        exit_value(graph, value)
                    } else {
                        value
                    }
                })
                .collect()
        };
        let node = match fixed {
            Fixed::Write(loc, value) => Node::write(location(*loc), values(&mut graph, &[*value])),
            Fixed::Sink(indices) => Node::sink(values(&mut graph, indices)),
            Fixed::Clobber(code) => clobber(*code),
        };
        items[slot].push(graph.add(node));
    }

    let mut builder = CfgBuilder::new();
    let block = |first: NodeId, items: &[NodeId], last: NodeId| {
        let mut nodes = vec![first];
        nodes.extend_from_slice(items);
        nodes.push(last);
        nodes
    };

    match program.shape {
        Shape::Straight => {
            let ret = graph.add(Node::ret(None));
            builder.add_block(block(start, &items[0], ret));
        }
        Shape::Diamond => {
            let c = graph.add(Node::constant("c"));
            let branch = graph.add(Node::if_(c, 0.5));
            let left = graph.add(Node::begin());
            let left_end = graph.add(Node::end());
            let right = graph.add(Node::begin());
            let right_end = graph.add(Node::end());
            let merge = graph.add(Node::merge());
            let phi = graph.add(Node::phi(merge, [pool[0], pool[pool.len() - 1]]));
            let ret = graph.add(Node::ret(Some(phi)));

            let b0 = builder.add_block(block(start, &items[0], branch));
            let b1 = builder.add_block(block(left, &items[1], left_end));
            let b2 = builder.add_block(block(right, &items[2], right_end));
            let b3 = builder.add_block(block(merge, &items[3], ret));
            builder.add_edge(b0, b1);
            builder.add_edge(b0, b2);
            builder.add_edge(b1, b3);
            builder.add_edge(b2, b3);
        }
        Shape::Loop => {
            let l = loop_nodes.as_ref().expect("loop shape has loop nodes");
            let (header, memory, exit) = (l.header, l.memory, l.exit);
            let entry_end = graph.add(Node::end());
            let zero = graph.add(Node::constant("0"));
            let one = graph.add(Node::constant("1"));
            let i = graph.add(Node::phi(header, [zero]));
            let next = graph.add(Node::value("add", [i, one]));
            graph.add_input(i, next);
            let cond = graph.add(Node::value("lt", [i]));
            let branch = graph.add(Node::if_(cond, 0.9));
            let body = graph.add(Node::begin());
            let store = graph.add(Node::write(F1, [pool[pool.len() - 1]]));
            graph.add_input(memory, store);
            let body_end = graph.add(Node::end());
            let result = exit_value(&mut graph, i);
            let ret = graph.add(Node::ret(Some(result)));

            let mut body_items = items[2].clone();
            body_items.push(store);
            let b0 = builder.add_block(block(start, &items[0], entry_end));
            let b1 = builder.add_block(block(header, &items[1], branch));
            let b2 = builder.add_block(block(body, &body_items, body_end));
            let b3 = builder.add_block(block(exit, &items[3], ret));
            builder.add_edge(b0, b1);
            builder.add_edge(b1, b2);
            builder.add_edge(b1, b3);
            builder.add_edge(b2, b1);
        }
        Shape::Call => {
            let call = graph.add(Node::invoke([pool[0]]));
            let result = graph.add(Node::value("result", [call]));
            let normal = graph.add(Node::begin());
            let ret = graph.add(Node::ret(Some(result)));
            let exceptional = graph.add(Node::begin());
            let deopt = graph.add(Node::deoptimize());

            let b0 = builder.add_block(block(start, &items[0], call));
            let b1 = builder.add_block(block(normal, &items[1], ret));
            let b2 = builder.add_block(block(exceptional, &items[2], deopt));
            builder.add_edge(b0, b1);
            builder.add_edge(b0, b2);
        }
        Shape::NestedLoop => {
            let c = graph.add(Node::constant("c"));
            let entry_end = graph.add(Node::end());
            let outer = graph.add(Node::loop_begin());
            let outer_end = graph.add(Node::end());
            let inner = graph.add(Node::loop_begin());
            let inner_branch = graph.add(Node::if_(c, 0.9));
            let body = graph.add(Node::begin());
            let body_end = graph.add(Node::end());
            let inner_exit = graph.add(Node::loop_exit());
            let outer_branch = graph.add(Node::if_(c, 0.8));
            let latch = graph.add(Node::begin());
            let latch_end = graph.add(Node::end());
            let outer_exit = graph.add(Node::loop_exit());
            let ret = graph.add(Node::ret(None));

            let blocks = [
                block(start, &items[0], entry_end),
                block(outer, &items[1], outer_end),
                block(inner, &items[2], inner_branch),
                block(body, &items[3], body_end),
                block(inner_exit, &items[4], outer_branch),
                block(latch, &items[5], latch_end),
                block(outer_exit, &items[6], ret),
            ];
            let ids: Vec<_> = blocks.into_iter().map(|b| builder.add_block(b)).collect();
            for (from, to) in [(0, 1), (1, 2), (2, 3), (2, 4), (3, 2), (4, 5), (4, 6), (5, 1)] {
                builder.add_edge(ids[from], ids[to]);
            }
        }
    }

    let cfg = builder.build(&graph).expect("generated CFG is well formed");
    (graph, cfg)
}

fn phase(strategy: SchedulingStrategy) -> SchedulePhase {
    SchedulePhase::new(ScheduleConfig {
        verify: true,
        ..ScheduleConfig::with_strategy(strategy)
    })
}

// -- Properties --

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    /// Every strategy yields a schedule the verifier accepts, the same one
    /// each time.
    #[test]
    fn prop_schedules_verify_and_are_deterministic(program in program_strategy()) {
        let (graph, cfg) = build(&program);
        for strategy in SchedulingStrategy::ALL {
            let first = phase(strategy).run_immutable(&graph, &cfg);
            prop_assert!(first.is_ok(), "{}: {:?}", strategy, first);
            let unchecked = SchedulePhase::new(ScheduleConfig {
                verify: false,
                ..ScheduleConfig::with_strategy(strategy)
            })
            .run_immutable(&graph, &cfg)
            .unwrap();
            prop_assert_eq!(verify_schedule(&graph, &cfg, &unchecked), Ok(()));
            prop_assert_eq!(&first, &Ok(unchecked));
            let second = phase(strategy).run_immutable(&graph, &cfg);
            prop_assert_eq!(first, second);
        }
    }

    /// Deleting dead nodes does not change the schedule, and every live
    /// node of the pruned graph is scheduled.
    #[test]
    fn prop_pruning_is_stable(program in program_strategy()) {
        let (graph, cfg) = build(&program);
        for strategy in SchedulingStrategy::ALL {
            let kept = phase(strategy).run_immutable(&graph, &cfg).unwrap();

            let mut pruned_graph = graph.clone();
            let pruned = phase(strategy).run(&mut pruned_graph, &cfg).unwrap();
            prop_assert_eq!(&kept, &pruned);

            let again = phase(strategy).run_immutable(&pruned_graph, &cfg).unwrap();
            prop_assert_eq!(&again, &pruned);
            for node in pruned_graph.ids() {
                prop_assert!(pruned.block_of(node).is_some(), "{} unscheduled", node);
            }
        }
    }
}

#[test]
fn shapes_build() {
    for shape in Shape::ALL {
        let program = Program {
            shape,
            constants: 1,
            floating: vec![
                Floating::Read(0, 0),
                Floating::LoopRead(0),
                Floating::Value(vec![0, 1, 2]),
            ],
            fixed: vec![
                (0, Fixed::Write(0, 0)),
                (1, Fixed::Clobber(1)),
                (2, Fixed::Sink(vec![1, 2, 3])),
                (3, Fixed::Sink(vec![3])),
                (4, Fixed::Clobber(0)),
            ],
        };
        let (graph, cfg) = build(&program);
        assert_eq!(cfg.blocks().len(), shape.block_count());
        for strategy in SchedulingStrategy::ALL {
            let schedule = phase(strategy)
                .run_immutable(&graph, &cfg)
                .unwrap_or_else(|e| panic!("{shape:?} {strategy}: {e}"));
            assert_eq!(schedule.strategy(), strategy);
        }
    }
}
