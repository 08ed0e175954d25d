use log::info;
use rand::seq::SliceRandom;
use rusqlite::Connection;

use super::{Evening, EveningError, Result, require_performer};
use crate::db::models::{NewPerformer, Performer, Role, TicketType};
use crate::db::queries;
use crate::names;

/// Credentials presented at the door.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub passcode: String,
    /// Required for singers and audience, ignored for hosts.
    pub ticket_order: Option<i64>,
    /// The performer already logged in earlier tonight and wants that record back.
    pub returning: bool,
}

fn passcode_matches(expected: &str, given: &str) -> bool {
    expected.trim().to_lowercase() == given.trim().to_lowercase()
}

/// Check the order covers one more performer of this role. Returns its row id.
fn claim_ticket(conn: &Connection, role: Role, order_id: Option<i64>) -> Result<Option<i64>> {
    let wanted = match role {
        Role::Singer => TicketType::Singer,
        Role::Audience => TicketType::Audience,
        Role::Host => return Ok(None),
    };
    let order_id = order_id.ok_or_else(|| {
        EveningError::Validation("A ticket order number is required".to_string())
    })?;
    let order = queries::ticket_order(conn, order_id)?
        .ok_or_else(|| EveningError::Validation(format!("Unknown ticket order {order_id}")))?;

    if order.ticket_type != wanted {
        return Err(EveningError::Validation(format!(
            "Ticket order {order_id} holds {} tickets, not {} tickets",
            order.ticket_type.as_str(),
            wanted.as_str()
        )));
    }
    if queries::tickets_used(conn, order.id)? >= order.num_tickets {
        return Err(EveningError::TicketDepleted { order_id });
    }
    Ok(Some(order.id))
}

fn require_audience(performer: &Performer) -> Result<()> {
    if performer.role != Role::Audience {
        return Err(EveningError::Validation(format!(
            "{} is not in the audience",
            performer.display_name()
        )));
    }
    Ok(())
}

/// Reactivate a performer who logged out. No ticket is used.
fn rejoin(conn: &Connection, existing: Performer, role: Role) -> Result<Performer> {
    if existing.role != role {
        return Err(EveningError::Validation(format!(
            "{} logged in earlier as {}, not {}",
            existing.display_name(),
            existing.role.as_str(),
            role.as_str()
        )));
    }
    if existing.active {
        return Err(EveningError::AlreadyLoggedIn {
            name: existing.display_name(),
        });
    }
    queries::set_performer_active(conn, existing.id, true)?;
    require_performer(conn, existing.id)
}

impl Evening {
    /// Log a performer in. A new login whose name is taken fails with
    /// `NameCollision`; a returning one gets the earlier record back.
    pub fn login_performer(&self, req: &LoginRequest) -> Result<Performer> {
        let first_name = names::sanitize_name(&req.first_name);
        let last_name = names::sanitize_name(&req.last_name);
        if first_name.is_empty() || last_name.is_empty() {
            return Err(EveningError::Validation(
                "First and last name are required".to_string(),
            ));
        }
        let username = names::username(&first_name, &last_name);

        let performer = self.mutate("login_performer", |conn| {
            let event = queries::event_state(conn)?;
            if !passcode_matches(&event.passcode, &req.passcode) {
                return Err(EveningError::InvalidPasscode);
            }

            let existing = queries::performer_by_username(conn, &username)?;
            if req.returning {
                let existing = existing.ok_or_else(|| {
                    EveningError::Validation(format!(
                        "Nobody named {first_name} {last_name} logged in tonight. Could there be a typo?"
                    ))
                })?;
                return rejoin(conn, existing, req.role);
            }
            if let Some(existing) = existing {
                return Err(EveningError::NameCollision {
                    name: existing.display_name(),
                });
            }

            let ticket_order = claim_ticket(conn, req.role, req.ticket_order)?;
            let id = queries::insert_performer(
                conn,
                &NewPerformer {
                    username: username.clone(),
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    role: req.role,
                    join_time: self.clock.now(),
                    ticket_order,
                },
            )?;
            require_performer(conn, id)
        })?;

        info!(
            "Logged in {} as {}",
            performer.display_name(),
            performer.role.as_str()
        );
        Ok(performer)
    }

    /// Take a performer out of the lineup. Their songs stay.
    pub fn logout_performer(&self, performer_id: i64) -> Result<()> {
        let performer = self.mutate("logout_performer", |conn| {
            let performer = require_performer(conn, performer_id)?;
            queries::set_performer_active(conn, performer_id, false)?;
            Ok(performer)
        })?;
        info!("Logged out {}", performer.display_name());
        Ok(())
    }

    pub fn set_raffle_participation(&self, performer_id: i64, participate: bool) -> Result<()> {
        self.mutate("set_raffle_participation", |conn| {
            let performer = require_performer(conn, performer_id)?;
            require_audience(&performer)?;
            queries::set_raffle_participant(conn, performer_id, participate)?;
            Ok(())
        })
    }

    /// Let an audience member sing.
    pub fn promote_raffle_winner(&self, performer_id: i64) -> Result<Performer> {
        let winner = self.mutate("promote_raffle_winner", |conn| {
            let performer = require_performer(conn, performer_id)?;
            require_audience(&performer)?;
            queries::set_raffle_winner(conn, performer_id)?;
            require_performer(conn, performer_id)
        })?;
        info!("Raffle winner: {}", winner.display_name());
        Ok(winner)
    }

    /// Draw among active audience members who opted in and have not won yet.
    /// `None` when nobody is left to draw.
    pub fn draw_raffle_winner(&self) -> Result<Option<Performer>> {
        let winner = self.mutate("draw_raffle_winner", |conn| {
            let candidates: Vec<Performer> = queries::performers(conn)?
                .into_iter()
                .filter(|p| {
                    p.role == Role::Audience && p.active && p.raffle_participant && !p.raffle_winner
                })
                .collect();
            let Some(chosen) = candidates.choose(&mut rand::thread_rng()) else {
                return Ok(None);
            };
            queries::set_raffle_winner(conn, chosen.id)?;
            Ok(Some(require_performer(conn, chosen.id)?))
        })?;

        match &winner {
            Some(p) => info!("Raffle winner: {}", p.display_name()),
            None => info!("Raffle drawn with no candidates"),
        }
        Ok(winner)
    }
}
