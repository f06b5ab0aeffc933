//! Authorization rules, one function per decision. Handlers call these
//! uniformly instead of branching on roles inline.

use crate::models::{Ticket, User, ROLE_AGENT};

pub fn is_agent(user: &User) -> bool {
    user.role == ROLE_AGENT
}

/// Agents see every ticket; visitors only their own.
pub fn can_access_ticket(user: &User, ticket: &Ticket) -> bool {
    is_agent(user) || ticket.requester_id == user.id
}

pub fn can_change_ticket_status(user: &User) -> bool {
    is_agent(user)
}

pub fn can_assign_ticket(user: &User) -> bool {
    is_agent(user)
}

pub fn can_manage_knowledge_base(user: &User) -> bool {
    is_agent(user)
}

pub fn can_use_macros(user: &User) -> bool {
    is_agent(user)
}

pub fn can_view_dashboard(user: &User) -> bool {
    is_agent(user)
}
