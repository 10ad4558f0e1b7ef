//! Instant actions: resolved entirely within the tick they are applied.
//!
//! Dispatch is a tagged match on the request type string; unknown types get
//! `E_BAD_REQUEST`. Governance instants live in `governance.rs`.

use serde_json::json;

use voxel_world_proto::{
    InstantReq, E_BAD_REQUEST, E_INVALID_TARGET, E_NO_PERMISSION, E_NO_RESOURCE, E_OUT_OF_RANGE,
    E_RATE_LIMIT,
};

use crate::engine::container::parse_container_id;
use crate::engine::events::action_result;
use crate::engine::inventory::{self, stacks_to_map};
use crate::engine::signs::{BoardPost, Sign, BOARD_MAX_POSTS};
use crate::engine::trades::Trade;
use crate::engine::world::World;
use crate::geometry::{manhattan, Vec3i};

impl World {
    pub(crate) fn apply_instant(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        match inst.req_type.as_str() {
            "SAY" => self.instant_say(agent_id, inst, now_tick),
            "WHISPER" => self.instant_whisper(agent_id, inst, now_tick),
            "EAT" => self.instant_eat(agent_id, inst, now_tick),
            "SET_SIGN" => self.instant_set_sign(agent_id, inst, now_tick),
            "OPEN" => self.instant_open(agent_id, inst, now_tick),
            "POST_BOARD" => self.instant_post_board(agent_id, inst, now_tick),
            "OFFER_TRADE" => self.instant_offer_trade(agent_id, inst, now_tick),
            "ACCEPT_TRADE" => self.instant_accept_trade(agent_id, inst, now_tick),
            "DECLINE_TRADE" => self.instant_decline_trade(agent_id, inst, now_tick),
            "CREATE_ORG" => self.instant_create_org(agent_id, inst, now_tick),
            "JOIN_ORG" => self.instant_join_org(agent_id, inst, now_tick),
            "LEAVE_ORG" => self.instant_leave_org(agent_id, inst, now_tick),
            "ORG_DEPOSIT" => self.instant_org_deposit(agent_id, inst, now_tick),
            "ORG_WITHDRAW" => self.instant_org_withdraw(agent_id, inst, now_tick),
            "DEED_LAND" => self.instant_deed_land(agent_id, inst, now_tick),
            "ADD_MEMBER" => self.instant_add_member(agent_id, inst, now_tick),
            "REMOVE_MEMBER" => self.instant_remove_member(agent_id, inst, now_tick),
            "SET_PERMISSIONS" => self.instant_set_permissions(agent_id, inst, now_tick),
            "PROPOSE_LAW" => self.instant_propose_law(agent_id, inst, now_tick),
            "VOTE" => self.instant_vote(agent_id, inst, now_tick),
            "REPEAL_LAW" => self.instant_repeal_law(agent_id, inst, now_tick),
            _ => self.push_action_result(
                agent_id,
                now_tick,
                &inst.id,
                false,
                E_BAD_REQUEST,
                "unknown instant type",
            ),
        }
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    fn instant_say(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.text.is_empty() {
            self.push_action_result(agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing text");
            return;
        }
        let channel = {
            let c = inst.channel.trim().to_ascii_uppercase();
            if c.is_empty() {
                "LOCAL".to_string()
            } else {
                c
            }
        };
        match channel.as_str() {
            "LOCAL" | "CITY" | "ORG" | "MARKET" => {}
            _ => {
                self.push_action_result(
                    agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "invalid channel",
                );
                return;
            }
        }

        let (org_id, pos) = match self.agents.get(agent_id) {
            Some(a) => (a.org_id.clone(), a.pos),
            None => return,
        };
        match channel.as_str() {
            "CITY" => {
                let in_city = !org_id.is_empty()
                    && self.orgs.get(&org_id).is_some_and(|o| {
                        o.kind == crate::engine::orgs::OrgKind::City && o.is_member(agent_id)
                    });
                if !in_city {
                    self.push_action_result(
                        agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not in a city",
                    );
                    return;
                }
            }
            "ORG" => {
                if org_id.is_empty() || !self.is_org_member(agent_id, &org_id) {
                    self.push_action_result(
                        agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not in org",
                    );
                    return;
                }
            }
            "MARKET" => {
                let (_, perms) = self.permissions_for(agent_id, pos);
                if !perms.can_trade {
                    self.push_action_result(
                        agent_id,
                        now_tick,
                        &inst.id,
                        false,
                        E_NO_PERMISSION,
                        "market chat not allowed here",
                    );
                    return;
                }
            }
            _ => {}
        }

        let (kind, window, max, msg) = if channel == "MARKET" {
            (
                "SAY_MARKET",
                self.cfg.rate_limits.market_say_window_ticks,
                self.cfg.rate_limits.market_say_max,
                "too many SAY (MARKET)",
            )
        } else {
            (
                "SAY",
                self.cfg.rate_limits.say_window_ticks,
                self.cfg.rate_limits.say_max,
                "too many SAY",
            )
        };
        if !self.check_rate_limit(agent_id, &inst.id, kind, window, max, msg, now_tick) {
            return;
        }

        self.broadcast_chat(now_tick, agent_id, &channel, &inst.text);
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    fn instant_whisper(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        let window = self.cfg.rate_limits.whisper_window_ticks;
        let max = self.cfg.rate_limits.whisper_max;
        if !self.check_rate_limit(agent_id, &inst.id, "WHISPER", window, max, "too many WHISPER", now_tick)
        {
            return;
        }
        if inst.to.is_empty() || inst.text.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing to/text",
            );
            return;
        }
        if !self.agents.contains_key(&inst.to) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "target not found",
            );
            return;
        }
        let ev = json!({
            "t": now_tick,
            "type": "CHAT",
            "from": agent_id,
            "channel": "WHISPER",
            "text": inst.text,
        });
        self.push_event(&inst.to, ev);
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    /// Shared limiter check; pushes the E_RATE_LIMIT result on violation.
    pub(crate) fn check_rate_limit(
        &mut self,
        agent_id: &str,
        ref_id: &str,
        kind: &str,
        window: u64,
        max: i64,
        msg: &str,
        now_tick: u64,
    ) -> bool {
        let Some(a) = self.agents.get_mut(agent_id) else {
            return false;
        };
        let (ok, cooldown) = a.rate_limit_allow(kind, now_tick, window, max);
        if ok {
            return true;
        }
        let mut ev = action_result(now_tick, ref_id, false, E_RATE_LIMIT, msg);
        if let Some(obj) = ev.as_object_mut() {
            obj.insert("cooldown_ticks".to_string(), json!(cooldown));
            obj.insert("cooldown_until_tick".to_string(), json!(now_tick + cooldown));
        }
        self.push_event(agent_id, ev);
        false
    }

    // ------------------------------------------------------------------
    // Survival
    // ------------------------------------------------------------------

    fn instant_eat(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.item_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing item_id",
            );
            return;
        }
        let n = inst.count.max(1);
        let Some(def) = self.catalogs.items.defs.get(&inst.item_id).cloned() else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "unknown item",
            );
            return;
        };
        if def.kind != "FOOD" || def.edible_hp <= 0 {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "item not edible",
            );
            return;
        }
        let Some(a) = self.agents.get_mut(agent_id) else {
            return;
        };
        if inventory::count(&a.inventory, &inst.item_id) < n {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_RESOURCE, "missing food",
            );
            return;
        }
        inventory::take(&mut a.inventory, &inst.item_id, n);
        a.hp = (a.hp + def.edible_hp * n).min(20);
        a.hunger = (a.hunger + n).min(10);
        a.stamina_milli = (a.stamina_milli + def.edible_hp * 50 * n).min(1000);
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    // ------------------------------------------------------------------
    // Signs and boards
    // ------------------------------------------------------------------

    fn instant_set_sign(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        let Some(pos) = inst.pos.map(Vec3i::from_array) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing pos",
            );
            return;
        };
        let agent_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return,
        };
        if manhattan(agent_pos, pos) > 3 {
            self.push_action_result(agent_id, now_tick, &inst.id, false, E_OUT_OF_RANGE, "too far");
            return;
        }
        let block = self.chunks.get_block(pos);
        if self.catalogs.block_name(block) != "SIGN" {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "no sign here",
            );
            return;
        }
        if !self.can_build_at(agent_id, pos, now_tick) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "sign edit denied",
            );
            return;
        }
        let text: String = inst.text.chars().take(120).collect();
        self.signs.insert(
            pos,
            Sign {
                text: text.clone(),
                updated_by: agent_id.to_string(),
                updated_tick: now_tick,
            },
        );
        self.audit_event(
            now_tick,
            agent_id,
            "SIGN_SET",
            pos,
            "SET_SIGN",
            json!({"text": text}),
        );
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    fn instant_post_board(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        let window = self.cfg.rate_limits.post_board_window_ticks;
        let max = self.cfg.rate_limits.post_board_max;
        if !self.check_rate_limit(
            agent_id, &inst.id, "POST_BOARD", window, max, "too many POST_BOARD", now_tick,
        ) {
            return;
        }
        let Some((kind, pos)) = parse_container_id(&inst.target_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing board id",
            );
            return;
        };
        if kind != "BULLETIN_BOARD" || self.catalogs.block_name(self.chunks.get_block(pos)) != "BULLETIN_BOARD" {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "board not found",
            );
            return;
        }
        let agent_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return,
        };
        if manhattan(agent_pos, pos) > 3 {
            self.push_action_result(agent_id, now_tick, &inst.id, false, E_OUT_OF_RANGE, "too far");
            return;
        }
        if inst.title.trim().is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing title",
            );
            return;
        }
        let post_id = self.next_post_id();
        let board = self.boards.entry(pos).or_default();
        board.posts.push(BoardPost {
            post_id: post_id.clone(),
            author: agent_id.to_string(),
            title: inst.title.trim().chars().take(60).collect(),
            body: inst.body.chars().take(400).collect(),
            tick: now_tick,
        });
        while board.posts.len() > BOARD_MAX_POSTS {
            board.posts.remove(0);
        }
        let mut ev = action_result(now_tick, &inst.id, true, "", "ok");
        if let Some(obj) = ev.as_object_mut() {
            obj.insert("post_id".to_string(), json!(post_id));
        }
        self.push_event(agent_id, ev);
    }

    /// Reads a container, sign or board by id. Shared with the OPEN task.
    fn instant_open(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        match self.open_target(agent_id, &inst.target_id, now_tick) {
            Ok(()) => self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok"),
            Err((code, msg)) => {
                self.push_action_result(agent_id, now_tick, &inst.id, false, code, msg)
            }
        }
    }

    /// Resolves an OPEN target and pushes the content event. Returns the
    /// failure code/message for the caller to wrap.
    pub(crate) fn open_target(
        &mut self,
        agent_id: &str,
        target_id: &str,
        now_tick: u64,
    ) -> Result<(), (&'static str, &'static str)> {
        let Some((kind, pos)) = parse_container_id(target_id) else {
            return Err((E_BAD_REQUEST, "bad target id"));
        };
        let agent_pos = self
            .agents
            .get(agent_id)
            .map(|a| a.pos)
            .ok_or((E_INVALID_TARGET, "unknown agent"))?;
        if manhattan(agent_pos, pos) > 3 {
            return Err((E_OUT_OF_RANGE, "too far"));
        }

        match kind.as_str() {
            "SIGN" => {
                let s = self.signs.get(&pos).cloned().unwrap_or_default();
                let ev = json!({
                    "t": now_tick,
                    "type": "SIGN",
                    "sign_id": target_id,
                    "pos": pos.to_array(),
                    "text": s.text,
                    "has_text": !s.text.is_empty(),
                    "updated_by": s.updated_by,
                    "updated_tick": s.updated_tick,
                });
                self.push_event(agent_id, ev);
                Ok(())
            }
            "BULLETIN_BOARD" => {
                if self.catalogs.block_name(self.chunks.get_block(pos)) != "BULLETIN_BOARD" {
                    return Err((E_INVALID_TARGET, "board not found"));
                }
                let posts: Vec<serde_json::Value> = self
                    .boards
                    .get(&pos)
                    .map(|b| {
                        b.posts
                            .iter()
                            .rev()
                            .map(|p| {
                                json!({
                                    "post_id": p.post_id,
                                    "author": p.author,
                                    "title": p.title,
                                    "body": p.body,
                                    "t": p.tick,
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let ev = json!({
                    "t": now_tick,
                    "type": "BOARD",
                    "board_id": target_id,
                    "pos": pos.to_array(),
                    "posts": posts,
                });
                self.push_event(agent_id, ev);
                Ok(())
            }
            _ => {
                let Some(c) = self.containers.get(&pos) else {
                    return Err((E_INVALID_TARGET, "container not found"));
                };
                if c.kind != kind {
                    return Err((E_INVALID_TARGET, "container not found"));
                }
                let ev = json!({
                    "t": now_tick,
                    "type": "CONTAINER",
                    "container": c.id(),
                    "container_type": c.kind,
                    "pos": c.pos.to_array(),
                    "inventory": inventory::sorted_stacks(&c.inventory),
                });
                self.push_event(agent_id, ev);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    fn instant_offer_trade(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        let window = self.cfg.rate_limits.offer_trade_window_ticks;
        let max = self.cfg.rate_limits.offer_trade_max;
        if !self.check_rate_limit(
            agent_id, &inst.id, "OFFER_TRADE", window, max, "too many OFFER_TRADE", now_tick,
        ) {
            return;
        }
        let pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return,
        };
        let (_, perms) = self.permissions_for(agent_id, pos);
        if !perms.can_trade {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "trade not allowed here",
            );
            return;
        }
        if inst.to.is_empty() {
            self.push_action_result(agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing to");
            return;
        }
        if !self.agents.contains_key(&inst.to) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "target not found",
            );
            return;
        }
        let Some(offer) = stacks_to_map(&inst.offer) else {
            self.push_action_result(agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "bad offer");
            return;
        };
        let Some(request) = stacks_to_map(&inst.request) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "bad request",
            );
            return;
        };

        let trade_id = self.next_trade_id();
        self.trades.insert(
            trade_id.clone(),
            Trade {
                trade_id: trade_id.clone(),
                from: agent_id.to_string(),
                to: inst.to.clone(),
                offer: offer.clone(),
                request: request.clone(),
                created_tick: now_tick,
            },
        );
        let notify = json!({
            "t": now_tick,
            "type": "TRADE_OFFER",
            "trade_id": trade_id,
            "from": agent_id,
            "offer": inventory::stacks_json(&offer),
            "request": inventory::stacks_json(&request),
        });
        self.push_event(&inst.to, notify);
        let mut ev = action_result(now_tick, &inst.id, true, "", "");
        if let Some(obj) = ev.as_object_mut() {
            obj.insert("trade_id".to_string(), json!(trade_id));
        }
        self.push_event(agent_id, ev);
    }

    fn instant_accept_trade(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.trade_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing trade_id",
            );
            return;
        }
        let Some(trade) = self.trades.get(&inst.trade_id).cloned() else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "trade not found",
            );
            return;
        };
        if trade.to != agent_id {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not your trade",
            );
            return;
        }
        let Some(from_pos) = self.agents.get(&trade.from).map(|a| a.pos) else {
            self.trades.remove(&inst.trade_id);
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "trader offline",
            );
            return;
        };
        let to_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return,
        };

        let (from_land, from_perms) = {
            let (land, perms) = self.permissions_for(&trade.from, from_pos);
            (land.map(|l| l.land_id.clone()), perms)
        };
        let (to_land, to_perms) = {
            let (land, perms) = self.permissions_for(agent_id, to_pos);
            (land.map(|l| l.land_id.clone()), perms)
        };
        if !from_perms.can_trade || !to_perms.can_trade {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "trade not allowed here",
            );
            return;
        }

        let from_has = self
            .agents
            .get(&trade.from)
            .is_some_and(|a| inventory::has_all(&a.inventory, &trade.offer));
        let to_has = self
            .agents
            .get(agent_id)
            .is_some_and(|a| inventory::has_all(&a.inventory, &trade.request));
        if !from_has || !to_has {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_RESOURCE, "missing items",
            );
            return;
        }

        // Market tax applies when both parties stand inside the same claim
        // with a non-zero rate and trading allowed there.
        let mut tax_rate = 0.0;
        let mut tax_owner = String::new();
        let mut land_id = String::new();
        if let (Some(fl), Some(tl)) = (from_land.as_ref(), to_land.as_ref()) {
            if fl == tl {
                if let Some(claim) = self.claims.get(fl) {
                    if claim.market_tax > 0.0 && claim.flags.allow_trade {
                        tax_rate = claim.market_tax;
                        tax_owner = claim.owner.clone();
                        land_id = claim.land_id.clone();
                    }
                }
            }
        }

        self.execute_trade_transfer(&trade, tax_rate, &tax_owner);
        self.trades.remove(&inst.trade_id);

        self.audit_event(
            now_tick,
            agent_id,
            "TRADE",
            Vec3i::default(),
            "ACCEPT_TRADE",
            json!({
                "trade_id": trade.trade_id,
                "from": trade.from,
                "to": trade.to,
                "offer": inventory::stacks_json(&trade.offer),
                "request": inventory::stacks_json(&trade.request),
                "tax_rate": tax_rate,
                "tax_paid_off": inventory::stacks_json(&inventory::calc_tax(&trade.offer, tax_rate)),
                "tax_paid_req": inventory::stacks_json(&inventory::calc_tax(&trade.request, tax_rate)),
                "land_id": land_id,
                "tax_to": tax_owner,
            }),
        );

        self.fun_on_trade(&trade.from, now_tick);
        self.fun_on_trade(agent_id, now_tick);

        let done_from = json!({
            "t": now_tick, "type": "TRADE_DONE", "trade_id": trade.trade_id, "with": trade.to,
        });
        let done_to = json!({
            "t": now_tick, "type": "TRADE_DONE", "trade_id": trade.trade_id, "with": trade.from,
        });
        self.push_event(&trade.from, done_from);
        self.push_event(agent_id, done_to);
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    /// Applies both legs of the trade with the tax siphoned to the claim
    /// owner (agent inventory or org treasury; unresolvable owners burn it).
    fn execute_trade_transfer(&mut self, trade: &Trade, tax_rate: f64, tax_owner: &str) {
        let legs = [
            (trade.from.clone(), trade.to.clone(), trade.offer.clone()),
            (trade.to.clone(), trade.from.clone(), trade.request.clone()),
        ];
        for (src_id, dst_id, items) in legs {
            let Some(mut src_inv) = self
                .agents
                .get_mut(&src_id)
                .map(|a| std::mem::take(&mut a.inventory))
            else {
                continue;
            };
            let Some(mut dst_inv) = self
                .agents
                .get_mut(&dst_id)
                .map(|a| std::mem::take(&mut a.inventory))
            else {
                if let Some(a) = self.agents.get_mut(&src_id) {
                    a.inventory = src_inv;
                }
                continue;
            };

            let mut tax_sink = crate::engine::inventory::Inventory::new();
            let sink = (tax_rate > 0.0 && !tax_owner.is_empty()).then_some(&mut tax_sink);
            inventory::transfer_with_tax(&mut src_inv, &mut dst_inv, &items, sink, tax_rate);

            // Restore before crediting so an owner who is also a trading
            // party receives the tax into their live inventory.
            if let Some(a) = self.agents.get_mut(&src_id) {
                a.inventory = src_inv;
            }
            if let Some(a) = self.agents.get_mut(&dst_id) {
                a.inventory = dst_inv;
            }
            if !tax_sink.is_empty() {
                self.credit_owner(tax_owner, &tax_sink);
            }
        }
    }

    /// Credits items to a claim owner: agent inventory, else org treasury.
    pub(crate) fn credit_owner(&mut self, owner: &str, items: &crate::engine::inventory::Inventory) {
        if let Some(a) = self.agents.get_mut(owner) {
            for (item, &n) in items {
                inventory::add(&mut a.inventory, item, n);
            }
        } else if let Some(org) = self.orgs.get_mut(owner) {
            for (item, &n) in items {
                inventory::add(&mut org.treasury, item, n);
            }
        }
    }

    fn instant_decline_trade(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.trade_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing trade_id",
            );
            return;
        }
        let Some(trade) = self.trades.get(&inst.trade_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "trade not found",
            );
            return;
        };
        if trade.to != agent_id {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not your trade",
            );
            return;
        }
        let from = trade.from.clone();
        let trade_id = trade.trade_id.clone();
        self.trades.remove(&inst.trade_id);
        let ev = json!({
            "t": now_tick, "type": "TRADE_DECLINED", "trade_id": trade_id, "by": agent_id,
        });
        self.push_event(&from, ev);
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "declined");
    }
}
