//! Spawn-like API shapes.
//!
//! An [`ApiShape`] describes a call that hands a callback to asynchronous
//! execution: the owning package, the receiver type for methods, the member
//! name, where the callback sits among the operands, and the patterns a
//! callback must satisfy. Shapes are data; the [`ShapeRegistry`] matches call
//! sites against them and, for task constructors, walks backward from the
//! call that runs a task to the call that built it.

use std::collections::BTreeSet;
use std::fmt;

use ctxflow_ast::{CallRef, Expr, ExprKind, NodeId, Span, UnaryOp};
use ctxflow_diag::Category;
use ctxflow_sema::TypeInfo;
use ctxflow_types::{FuncRef, Type, package_name, same_package};

use crate::CheckContext;
use crate::assign::last_assignment;
use crate::deriver::FuncSpec;
use crate::pattern::Pattern;

const ERRGROUP: &str = "golang.org/x/sync/errgroup";
const SYNC: &str = "sync";
const CONC: &str = "github.com/sourcegraph/conc";
const CONC_POOL: &str = "github.com/sourcegraph/conc/pool";
const CONC_STREAM: &str = "github.com/sourcegraph/conc/stream";
const CONC_ITER: &str = "github.com/sourcegraph/conc/iter";
const GOTASK: &str = "github.com/mpyw/gotask";

/// Where the callback of a matched call is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSlot {
    /// The argument at this index.
    Arg(usize),
    /// Every argument from this index on.
    Variadic(usize),
    /// The receiver of a method call (for task consumers).
    Receiver,
    /// Every function-typed argument.
    FuncArgs,
}

/// Identity of a shape: owner package, receiver type name and member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeKey {
    pub owner: String,
    pub receiver: Option<String>,
    pub member: String,
}

impl ShapeKey {
    pub fn func(owner: &str, member: &str) -> Self {
        Self {
            owner: owner.to_string(),
            receiver: None,
            member: member.to_string(),
        }
    }

    pub fn method(owner: &str, receiver: &str, member: &str) -> Self {
        Self {
            owner: owner.to_string(),
            receiver: Some(receiver.to_string()),
            member: member.to_string(),
        }
    }

    fn matches(&self, func: &FuncRef) -> bool {
        func.name == self.member && func.recv == self.receiver && same_package(&func.path, &self.owner)
    }
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pkg = package_name(&self.owner);
        match &self.receiver {
            Some(recv) => write!(f, "{pkg}.{recv}.{}()", self.member),
            None => write!(f, "{pkg}.{}()", self.member),
        }
    }
}

/// Declarative description of one spawn-like call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiShape {
    pub key: ShapeKey,
    /// The checker that reports violations for this shape.
    pub checker: Category,
    pub callback: CallbackSlot,
    /// Alternatives: a callback passes if any of them passes.
    pub patterns: Vec<Pattern>,
    /// The call only builds a task; running it happens at one of
    /// `paired_consumers`.
    pub task_constructor: bool,
    pub paired_consumers: Vec<ShapeKey>,
}

impl ApiShape {
    fn new(key: ShapeKey, checker: Category, callback: CallbackSlot, patterns: Vec<Pattern>) -> Self {
        Self {
            key,
            checker,
            callback,
            patterns,
            task_constructor: false,
            paired_consumers: Vec::new(),
        }
    }

    /// Human readable name for messages, e.g. `errgroup.Group.Go()`.
    pub fn label(&self) -> String {
        self.key.to_string()
    }
}

/// A call site matched against a shape.
#[derive(Debug, Clone, Copy)]
pub struct ShapeMatch<'s> {
    pub shape: &'s ApiShape,
    /// Type arguments of a generic receiver (`Iterator[int]` binds `[int]`).
    pub type_args: &'s [Type],
}

#[derive(Debug, Clone, Default)]
pub struct ShapeRegistry {
    shapes: Vec<ApiShape>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table of well-known spawn APIs.
    pub fn with_defaults() -> Self {
        use CallbackSlot::{Arg, Receiver, Variadic};
        use Pattern::{ArgIsDerivation, CapturesCarrier, Derives, ReceivesCarrier};

        let mut registry = Self::new();
        for member in ["Go", "TryGo"] {
            registry.add(ApiShape::new(
                ShapeKey::method(ERRGROUP, "Group", member),
                Category::Errgroup,
                Arg(0),
                vec![CapturesCarrier],
            ));
        }
        registry.add(ApiShape::new(
            ShapeKey::method(SYNC, "WaitGroup", "Go"),
            Category::Waitgroup,
            Arg(0),
            vec![CapturesCarrier],
        ));

        let conc = |key, callback, patterns| ApiShape::new(key, Category::Conc, callback, patterns);
        registry.add(conc(
            ShapeKey::method(CONC, "WaitGroup", "Go"),
            Arg(0),
            vec![CapturesCarrier],
        ));
        for pool in ["Pool", "ErrorPool", "ResultPool", "ResultErrorPool"] {
            registry.add(conc(
                ShapeKey::method(CONC_POOL, pool, "Go"),
                Arg(0),
                vec![CapturesCarrier],
            ));
        }
        for pool in ["ContextPool", "ResultContextPool"] {
            registry.add(conc(
                ShapeKey::method(CONC_POOL, pool, "Go"),
                Arg(0),
                vec![ReceivesCarrier],
            ));
        }
        registry.add(conc(
            ShapeKey::method(CONC_STREAM, "Stream", "Go"),
            Arg(0),
            vec![CapturesCarrier],
        ));
        for member in ["ForEach", "ForEachIdx", "Map", "MapErr"] {
            registry.add(conc(
                ShapeKey::func(CONC_ITER, member),
                Arg(1),
                vec![CapturesCarrier],
            ));
        }
        for member in ["ForEach", "ForEachIdx"] {
            registry.add(conc(
                ShapeKey::method(CONC_ITER, "Iterator", member),
                Arg(1),
                vec![CapturesCarrier],
            ));
        }
        for member in ["Map", "MapErr"] {
            registry.add(conc(
                ShapeKey::method(CONC_ITER, "Mapper", member),
                Arg(1),
                vec![CapturesCarrier],
            ));
        }

        let consumers = vec![
            ShapeKey::method(GOTASK, "Task", "DoAsync"),
            ShapeKey::method(GOTASK, "CancelableTask", "DoAsync"),
            ShapeKey::func(GOTASK, "DoAll"),
            ShapeKey::func(GOTASK, "DoAllSettled"),
            ShapeKey::func(GOTASK, "DoRace"),
        ];
        registry.add(ApiShape {
            task_constructor: true,
            paired_consumers: consumers.clone(),
            ..ApiShape::new(
                ShapeKey::func(GOTASK, "NewTask"),
                Category::Gotask,
                Arg(0),
                vec![Derives],
            )
        });
        for key in consumers {
            let (callback, patterns) = if key.receiver.is_some() {
                (Receiver, vec![Derives, ArgIsDerivation { arg: 0 }])
            } else {
                (Variadic(1), vec![Derives])
            };
            registry.add(ApiShape::new(key, Category::Gotask, callback, patterns));
        }
        for member in ["DoAllFns", "DoAllFnsSettled", "DoRaceFns"] {
            registry.add(ApiShape::new(
                ShapeKey::func(GOTASK, member),
                Category::Gotask,
                Variadic(1),
                vec![Derives],
            ));
        }
        registry
    }

    /// Register a shape, replacing any shape with the same key.
    pub fn add(&mut self, shape: ApiShape) {
        self.shapes.retain(|existing| existing.key != shape.key);
        self.shapes.push(shape);
    }

    /// Declare `spec` a spawner: every function-typed argument runs
    /// asynchronously and must capture the carrier.
    pub fn add_spawner(&mut self, spec: FuncSpec) {
        let key = ShapeKey {
            owner: spec.path,
            receiver: spec.receiver,
            member: spec.name,
        };
        if self.shapes.iter().any(|shape| shape.key == key) {
            return;
        }
        self.shapes.push(ApiShape::new(
            key,
            Category::Spawner,
            CallbackSlot::FuncArgs,
            vec![Pattern::CapturesCarrier],
        ));
    }

    pub fn shapes(&self) -> &[ApiShape] {
        &self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn get(&self, key: &ShapeKey) -> Option<&ApiShape> {
        self.shapes.iter().find(|shape| &shape.key == key)
    }

    /// Match a call against the registry. Generic receivers match through
    /// their origin type; the bound type arguments are returned alongside.
    pub fn match_call<'s>(&'s self, call: CallRef<'_>, info: &'s TypeInfo) -> Option<ShapeMatch<'s>> {
        let callee = info.callee(call.expr)?;
        let shape = self
            .shapes
            .iter()
            .find(|shape| shape.key.matches(&callee.func))?;
        let type_args = callee
            .recv
            .as_ref()
            .and_then(Type::as_named)
            .map_or(&[][..], |named| named.args.as_slice());
        Some(ShapeMatch { shape, type_args })
    }

    /// The constructor shape whose tasks `consumer` runs.
    pub fn constructor_for(&self, consumer: &ShapeKey) -> Option<&ApiShape> {
        self.shapes
            .iter()
            .find(|shape| shape.task_constructor && shape.paired_consumers.contains(consumer))
    }

    /// Walk backward from a task value to the constructor call that built it.
    ///
    /// Handles parentheses, `&`/`*` wrappers, method chains rooted at the
    /// constructor (`NewTask(fn).Cancelable()`), and locals, which are followed
    /// to their last assignment strictly before `use_site`. Returns the
    /// constructor call, or `None` when the value cannot be traced.
    pub fn trace_constructor<'a>(
        &self,
        cx: &CheckContext<'a>,
        constructor: &ApiShape,
        expr: &'a Expr,
        use_site: Span,
    ) -> Option<CallRef<'a>> {
        let mut visited = BTreeSet::new();
        self.trace_constructor_inner(cx, constructor, expr, use_site, &mut visited)
    }

    fn trace_constructor_inner<'a>(
        &self,
        cx: &CheckContext<'a>,
        constructor: &ApiShape,
        expr: &'a Expr,
        use_site: Span,
        visited: &mut BTreeSet<NodeId>,
    ) -> Option<CallRef<'a>> {
        let expr = expr.unparen();
        if !visited.insert(expr.id) {
            return None;
        }
        match &expr.kind {
            ExprKind::Unary {
                op: UnaryOp::Addr | UnaryOp::Deref,
                operand,
            } => self.trace_constructor_inner(cx, constructor, operand, use_site, visited),
            ExprKind::Call { func, .. } => {
                let call = expr.as_call()?;
                if let Some(callee) = cx.info.callee(expr)
                    && constructor.key.matches(&callee.func)
                {
                    return Some(call);
                }
                // A method chained on a task value keeps the task.
                match &func.unparen().kind {
                    ExprKind::Selector { base, .. } if callee_is_method(cx.info, expr) => {
                        self.trace_constructor_inner(cx, constructor, base, use_site, visited)
                    }
                    _ => None,
                }
            }
            ExprKind::Ident(_) => {
                let binding = cx.info.binding_of(expr)?;
                let value = last_assignment(cx, binding, use_site)?;
                self.trace_constructor_inner(cx, constructor, value, value.span, visited)
            }
            _ => None,
        }
    }
}

fn callee_is_method(info: &TypeInfo, call: &Expr) -> bool {
    info.callee(call).is_some_and(|callee| callee.func.recv.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_each_checker() {
        let registry = ShapeRegistry::with_defaults();
        let checkers: BTreeSet<_> = registry.shapes().iter().map(|shape| shape.checker).collect();
        assert_eq!(
            checkers.into_iter().collect::<Vec<_>>(),
            vec![
                Category::Errgroup,
                Category::Waitgroup,
                Category::Conc,
                Category::Gotask
            ]
        );
    }

    #[test]
    fn constructor_pairs_with_consumers() {
        let registry = ShapeRegistry::with_defaults();
        let consumer = ShapeKey::method(GOTASK, "CancelableTask", "DoAsync");
        let constructor = registry.constructor_for(&consumer).expect("constructor");
        assert_eq!(constructor.label(), "gotask.NewTask()");
        assert!(
            registry
                .constructor_for(&ShapeKey::func(GOTASK, "DoAllFns"))
                .is_none()
        );
    }

    #[test]
    fn key_matching_ignores_major_version() {
        let task = ShapeKey::func(GOTASK, "NewTask");
        assert!(task.matches(&FuncRef::func("github.com/mpyw/gotask/v3", "NewTask")));
        let key = ShapeKey::method(CONC_POOL, "ContextPool", "Go");
        assert!(key.matches(&FuncRef::method(CONC_POOL, "ContextPool", "Go")));
        assert!(!key.matches(&FuncRef::method(CONC_POOL, "Pool", "Go")));
        assert!(!key.matches(&FuncRef::func(CONC_POOL, "Go")));
    }

    #[test]
    fn spawners_do_not_override_builtin_shapes() {
        let mut registry = ShapeRegistry::with_defaults();
        let before = registry.len();
        registry.add_spawner(FuncSpec::parse("golang.org/x/sync/errgroup.Group.Go").expect("spec"));
        assert_eq!(registry.len(), before);
        registry.add_spawner(FuncSpec::parse("example.com/app/workers.Spawn").expect("spec"));
        assert_eq!(registry.len(), before + 1);
        let spawner = registry
            .get(&ShapeKey::func("example.com/app/workers", "Spawn"))
            .expect("spawner");
        assert_eq!(spawner.checker, Category::Spawner);
        assert_eq!(spawner.callback, CallbackSlot::FuncArgs);
    }
}
