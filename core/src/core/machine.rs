/// Why a `Machine::run` call returned control to the caller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopReason {
    /// The requested tick budget was spent.
    BudgetSpent,
    /// An externally armed breakpoint address was reached.
    Breakpoint(u16),
    /// Single-step: one instruction completed.
    Stepped,
    /// The machine was halted from outside (debugger stop, external halt line).
    Halted,
}

/// Machine-agnostic interface for emulated systems.
///
/// The run loop is cooperative: `run` executes bus cycles until the tick
/// budget is spent or execution is externally stopped, then returns. It
/// never blocks waiting on a device — device delays are scheduled events
/// that fire as the clock advances.
pub trait Machine {
    /// Run until `budget` master-clock ticks have elapsed or execution is
    /// stopped for another reason. Must only be called between bus cycles
    /// (it always leaves the machine at a bus-cycle boundary).
    fn run(&mut self, budget: u64) -> StopReason;

    /// Execute exactly one CPU instruction.
    fn step(&mut self) -> StopReason;

    /// Reset the machine to its power-on state (CPU reset vector fetch,
    /// controller registers cleared).
    fn reset(&mut self);

    /// Request that `run` return control as soon as the current bus cycle
    /// completes. Safe to call from UI-event handlers between `run` calls.
    fn stop(&mut self);
}
