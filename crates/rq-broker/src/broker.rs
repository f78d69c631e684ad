use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use rq_types::{
    Account, Amount, Asset, Broker as BrokerTrait, Currency, Event, ExchangeRates, Instruction,
    Order, OrderError, OrderId, OrderStatus, RqError, RqResult, SingleOrder,
};

use crate::account_model::{self, AccountContext, AccountModel};
use crate::cost::CostModel;
use crate::executor::Executor;
use crate::ledger::Ledger;
use crate::pricing::PricingEngine;

/// One top-level order's executor state: a single leg, or a coordinated
/// group of legs for a composite order (§4.3's OCO/OTO/Bracket rules).
enum ExecutorKind {
    Single(Executor),
    Oco { a: Executor, b: Executor },
    Oto { primary: Executor, secondary: Executor, activated: bool },
    Bracket { entry: Executor, take_profit: Executor, stop_loss: Executor, entered: bool },
}

struct ExecutorSlot {
    top_id: OrderId,
    asset: Asset,
    kind: ExecutorKind,
}

impl ExecutorSlot {
    fn is_closed(&self) -> bool {
        match &self.kind {
            ExecutorKind::Single(e) => e.order().status.is_closed(),
            ExecutorKind::Oco { a, b } => a.order().status.is_closed() && b.order().status.is_closed(),
            ExecutorKind::Oto { primary, secondary, .. } => {
                primary.order().status.is_closed() && secondary.order().status.is_closed()
            }
            ExecutorKind::Bracket { entry, take_profit, stop_loss, .. } => {
                entry.order().status.is_closed() && take_profit.order().status.is_closed() && stop_loss.order().status.is_closed()
            }
        }
    }

    fn to_order(&self) -> Order {
        match &self.kind {
            ExecutorKind::Single(e) => Order::Single(e.order().clone()),
            ExecutorKind::Oco { a, b } => {
                Order::Composite(rq_types::CompositeOrder {
                    id: self.top_id,
                    status: if self.is_closed() { OrderStatus::Completed } else { OrderStatus::Accepted },
                    kind: rq_types::CompositeKind::Oco(a.order().clone(), b.order().clone()),
                })
            }
            ExecutorKind::Oto { primary, secondary, .. } => Order::Composite(rq_types::CompositeOrder {
                id: self.top_id,
                status: if self.is_closed() { OrderStatus::Completed } else { OrderStatus::Accepted },
                kind: rq_types::CompositeKind::Oto { primary: primary.order().clone(), secondary: secondary.order().clone() },
            }),
            ExecutorKind::Bracket { entry, take_profit, stop_loss, .. } => Order::Composite(rq_types::CompositeOrder {
                id: self.top_id,
                status: if self.is_closed() { OrderStatus::Completed } else { OrderStatus::Accepted },
                kind: rq_types::CompositeKind::Bracket {
                    entry: entry.order().clone(),
                    take_profit: take_profit.order().clone(),
                    stop_loss: stop_loss.order().clone(),
                },
            }),
        }
    }

    fn cancel_all(&mut self) {
        match &mut self.kind {
            ExecutorKind::Single(e) => e.order_mut().close(OrderStatus::Cancelled),
            ExecutorKind::Oco { a, b } => {
                a.order_mut().close(OrderStatus::Cancelled);
                b.order_mut().close(OrderStatus::Cancelled);
            }
            ExecutorKind::Oto { primary, secondary, .. } => {
                primary.order_mut().close(OrderStatus::Cancelled);
                secondary.order_mut().close(OrderStatus::Cancelled);
            }
            ExecutorKind::Bracket { entry, take_profit, stop_loss, .. } => {
                entry.order_mut().close(OrderStatus::Cancelled);
                take_profit.order_mut().close(OrderStatus::Cancelled);
                stop_loss.order_mut().close(OrderStatus::Cancelled);
            }
        }
    }
}

/// Reference broker implementation (C8): matches orders against simulated
/// price events, debits/credits a [`Ledger`] on every fill, and derives
/// buying power from a pluggable [`AccountModel`] (§4.2).
pub struct SimulatedBroker {
    pricing: Box<dyn PricingEngine>,
    cost: Box<dyn CostModel>,
    account_model: Box<dyn AccountModel>,
    rates: Box<dyn ExchangeRates>,
    base_currency: Currency,
    ledger: Ledger,
    executors: Vec<ExecutorSlot>,
    closed_orders: Vec<Order>,
    last_time: DateTime<Utc>,
}

impl SimulatedBroker {
    pub fn new(
        base_currency: Currency,
        initial_deposit: Amount,
        pricing: Box<dyn PricingEngine>,
        cost: Box<dyn CostModel>,
        account_model: Box<dyn AccountModel>,
        rates: Box<dyn ExchangeRates>,
    ) -> Self {
        let mut ledger = Ledger::new();
        ledger.deposit(initial_deposit);
        Self {
            pricing,
            cost,
            account_model,
            rates,
            base_currency,
            ledger,
            executors: Vec::new(),
            closed_orders: Vec::new(),
            last_time: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn buying_power(&self, time: DateTime<Utc>) -> RqResult<Amount> {
        let open_orders = self.open_order_legs();
        let ctx = AccountContext {
            ledger: &self.ledger,
            base_currency: &self.base_currency,
            rates: self.rates.as_ref(),
            time,
            open_orders: &open_orders,
        };
        self.account_model.buying_power(&ctx)
    }

    /// Every currently open single-order leg across all executor slots,
    /// composite legs included, for the account model to reserve buying
    /// power against (§4.7).
    fn open_order_legs(&self) -> Vec<SingleOrder> {
        let mut legs = Vec::new();
        for slot in &self.executors {
            match &slot.kind {
                ExecutorKind::Single(e) => push_if_open(&mut legs, e.order()),
                ExecutorKind::Oco { a, b } => {
                    push_if_open(&mut legs, a.order());
                    push_if_open(&mut legs, b.order());
                }
                ExecutorKind::Oto { primary, secondary, .. } => {
                    push_if_open(&mut legs, primary.order());
                    push_if_open(&mut legs, secondary.order());
                }
                ExecutorKind::Bracket { entry, take_profit, stop_loss, .. } => {
                    push_if_open(&mut legs, entry.order());
                    push_if_open(&mut legs, take_profit.order());
                    push_if_open(&mut legs, stop_loss.order());
                }
            }
        }
        legs
    }

    fn validate_single(&self, order: &SingleOrder, time: DateTime<Utc>) -> RqResult<()> {
        if order.size.is_zero() {
            return Err(RqError::Order(OrderError::ZeroSize));
        }
        let is_sell = order.size.is_sign_negative();
        let current = self.ledger.position(&order.asset).map(|p| p.size).unwrap_or(Decimal::ZERO);
        if is_sell && !self.account_model.allows_short() && current + order.size < Decimal::ZERO {
            return Err(RqError::Broker(rq_types::BrokerError::ShortingDisallowed { asset: order.asset.to_string() }));
        }

        let reference_price = account_model::reference_price(order, &self.ledger);
        let notional = order.size.abs() * reference_price * order.asset.multiplier;
        let notional_base = self.rates.convert(&Amount::new(order.asset.currency.clone(), notional), &self.base_currency, time)?;
        let bp = self.buying_power(time)?;
        if notional_base.value > bp.value {
            return Err(RqError::Broker(rq_types::BrokerError::InsufficientBuyingPower {
                required: notional_base.value.to_string(),
                available: bp.value.to_string(),
            }));
        }
        Ok(())
    }

    fn accept_into_slot(&mut self, order: Order, time: DateTime<Utc>) -> RqResult<()> {
        match order {
            Order::Single(mut o) => {
                self.validate_single(&o, time)?;
                o.accept(time);
                let asset = o.asset.clone();
                let top_id = o.id;
                self.executors.push(ExecutorSlot { top_id, asset, kind: ExecutorKind::Single(Executor::new(o)) });
                Ok(())
            }
            Order::Composite(c) => {
                let top_id = c.id;
                match c.kind {
                    rq_types::CompositeKind::Oco(mut a, mut b) => {
                        self.validate_single(&a, time)?;
                        self.validate_single(&b, time)?;
                        a.accept(time);
                        b.accept(time);
                        let asset = a.asset.clone();
                        self.executors.push(ExecutorSlot {
                            top_id,
                            asset,
                            kind: ExecutorKind::Oco { a: Executor::new(a), b: Executor::new(b) },
                        });
                    }
                    rq_types::CompositeKind::Oto { mut primary, secondary } => {
                        self.validate_single(&primary, time)?;
                        primary.accept(time);
                        let asset = primary.asset.clone();
                        self.executors.push(ExecutorSlot {
                            top_id,
                            asset,
                            kind: ExecutorKind::Oto { primary: Executor::new(primary), secondary: Executor::new(secondary), activated: false },
                        });
                    }
                    rq_types::CompositeKind::Bracket { mut entry, take_profit, stop_loss } => {
                        self.validate_single(&entry, time)?;
                        entry.accept(time);
                        let asset = entry.asset.clone();
                        self.executors.push(ExecutorSlot {
                            top_id,
                            asset,
                            kind: ExecutorKind::Bracket { entry: Executor::new(entry), take_profit: Executor::new(take_profit), stop_loss: Executor::new(stop_loss), entered: false },
                        });
                    }
                }
                Ok(())
            }
        }
    }

    fn find_slot_mut(&mut self, target: OrderId) -> Option<&mut ExecutorSlot> {
        self.executors.iter_mut().find(|s| s.top_id == target)
    }
}

impl BrokerTrait for SimulatedBroker {
    fn place(&mut self, instructions: Vec<Instruction>, event: &Event) -> RqResult<Account> {
        let time = event.time;
        self.last_time = time;

        for instruction in instructions {
            match instruction {
                Instruction::Create(order) => {
                    if let Err(err) = self.accept_into_slot(order, time) {
                        tracing::debug!(?err, "order rejected at placement");
                    }
                }
                Instruction::Cancel { target } => match self.find_slot_mut(target) {
                    Some(slot) => slot.cancel_all(),
                    None => tracing::debug!(%target, "cancel target not found"),
                },
                Instruction::Update { target, replacement } => match (self.find_slot_mut(target), &replacement) {
                    (Some(slot), Order::Single(new)) => {
                        if let ExecutorKind::Single(exec) = &mut slot.kind {
                            if exec.order().asset == new.asset {
                                let o = exec.order_mut();
                                o.kind = new.kind.clone();
                                o.tif = new.tif;
                                o.size = new.size;
                            }
                        }
                    }
                    (None, _) => tracing::debug!(%target, "update target not found"),
                    _ => {}
                },
            }
        }

        // Mark every asset present in this event to market, fill-eligible or not.
        for (asset, item) in &event.items {
            let price = item.price_of(rq_types::PriceKind::Default);
            self.ledger.mark_to_market(asset, price);
        }

        if !event.is_heartbeat() {
            let prices = event.prices();
            for slot in self.executors.iter_mut() {
                let Some(item) = prices.get(&slot.asset).copied() else { continue };
                run_slot(slot, self.pricing.as_ref(), item, time, &mut self.ledger, self.cost.as_ref());
            }
        }

        self.executors.retain(|slot| {
            if slot.is_closed() {
                self.closed_orders.push(slot.to_order());
                false
            } else {
                true
            }
        });

        self.sync_at(time)
    }

    fn sync(&self) -> Account {
        self.sync_at(self.last_time).unwrap_or_else(|_| Account::new(self.base_currency.clone(), self.last_time))
    }

    fn reset(&mut self) {
        self.ledger = Ledger::new();
        self.executors.clear();
        self.closed_orders.clear();
        self.last_time = DateTime::<Utc>::MIN_UTC;
    }
}

impl SimulatedBroker {
    fn sync_at(&self, time: DateTime<Utc>) -> RqResult<Account> {
        let bp = self.buying_power(time)?;
        let mut account = Account::new(self.base_currency.clone(), time);
        account.cash = self.ledger.cash.clone();
        account.positions = self.ledger.positions().map(|p| (p.asset.to_string(), p.clone())).collect();
        account.open_orders = self.executors.iter().map(|s| s.to_order()).collect();
        account.closed_orders = self.closed_orders.clone();
        account.trades = self.ledger.trades.clone();
        account.buying_power = bp;
        Ok(account)
    }
}

fn push_if_open(legs: &mut Vec<SingleOrder>, order: &SingleOrder) {
    if order.status.is_open() {
        legs.push(order.clone());
    }
}

fn run_slot(
    slot: &mut ExecutorSlot,
    pricing: &dyn PricingEngine,
    item: &rq_types::PriceItem,
    time: DateTime<Utc>,
    ledger: &mut Ledger,
    cost: &dyn CostModel,
) {
    let asset = slot.asset.clone();
    match &mut slot.kind {
        ExecutorKind::Single(e) => apply(e, pricing, item, time, ledger, cost, &asset),

        ExecutorKind::Oco { a, b } => {
            if a.order().status.is_open() {
                let before = a.order().status;
                apply(a, pricing, item, time, ledger, cost, &asset);
                if before != a.order().status && a.order().status == OrderStatus::Completed {
                    b.order_mut().close(OrderStatus::Cancelled);
                    return;
                }
            }
            if b.order().status.is_open() {
                let before = b.order().status;
                apply(b, pricing, item, time, ledger, cost, &asset);
                if before != b.order().status && b.order().status == OrderStatus::Completed {
                    a.order_mut().close(OrderStatus::Cancelled);
                }
            }
        }

        ExecutorKind::Oto { primary, secondary, activated } => {
            if !*activated {
                apply(primary, pricing, item, time, ledger, cost, &asset);
                if primary.order().status == OrderStatus::Completed {
                    *activated = true;
                    secondary.order_mut().accept(time);
                }
            }
            if *activated {
                apply(secondary, pricing, item, time, ledger, cost, &asset);
            }
        }

        ExecutorKind::Bracket { entry, take_profit, stop_loss, entered } => {
            if !*entered {
                apply(entry, pricing, item, time, ledger, cost, &asset);
                if entry.order().status == OrderStatus::Completed {
                    *entered = true;
                    take_profit.order_mut().accept(time);
                    stop_loss.order_mut().accept(time);
                }
            }
            if *entered {
                if take_profit.order().status.is_open() {
                    let before = take_profit.order().status;
                    apply(take_profit, pricing, item, time, ledger, cost, &asset);
                    if before != take_profit.order().status && take_profit.order().status == OrderStatus::Completed {
                        stop_loss.order_mut().close(OrderStatus::Cancelled);
                        return;
                    }
                }
                if stop_loss.order().status.is_open() {
                    let before = stop_loss.order().status;
                    apply(stop_loss, pricing, item, time, ledger, cost, &asset);
                    if before != stop_loss.order().status && stop_loss.order().status == OrderStatus::Completed {
                        take_profit.order_mut().close(OrderStatus::Cancelled);
                    }
                }
            }
        }
    }
}

fn apply(
    exec: &mut Executor,
    pricing: &dyn PricingEngine,
    item: &rq_types::PriceItem,
    time: DateTime<Utc>,
    ledger: &mut Ledger,
    cost: &dyn CostModel,
    asset: &Asset,
) {
    let order_id = exec.order().id;
    for e in exec.execute(pricing, item, time) {
        let fee = cost.fee(&e);
        ledger.apply_execution(asset, e, fee, order_id, time);
    }
}
