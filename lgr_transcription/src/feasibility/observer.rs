use std::{cell::RefCell, rc::Rc};

use argmin::core::{Error, KV, State, observers::Observe};

/// Records the cost of every iteration. Clones share one history, so keep
/// a clone to read it back after the executor consumes the original.
#[derive(Clone, Default)]
pub struct CostHistoryObserver {
    cost_history: Rc<RefCell<Vec<f64>>>,
}

impl CostHistoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cost_history(&self) -> Vec<f64> {
        self.cost_history.borrow().clone()
    }

    pub fn observe_cost(&self, cost: f64) {
        self.cost_history.borrow_mut().push(cost);
    }
}

impl<I> Observe<I> for CostHistoryObserver
where
    I: State<Float = f64>,
{
    fn observe_init(&mut self, _name: &str, state: &I, _kv: &KV) -> Result<(), Error> {
        let cost = state.get_cost();
        if cost.is_finite() {
            self.observe_cost(cost);
        }
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        self.observe_cost(state.get_cost());
        Ok(())
    }
}
