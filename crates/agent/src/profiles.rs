/// An agent as the conversation manager sees it: who it is, what it is for,
/// how it is briefed, and which functions it may call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub system_message: &'static str,
    pub functions: &'static [&'static str],
}

pub fn shipment_agent() -> AgentProfile {
    AgentProfile {
        name: "ShipmentAgent",
        description: "Manages shipments in the shipment database.",
        system_message: "Your role is to work with the shipment database. Use 'query_shipment' \
            for SELECT queries, written as plain PostgreSQL without code fences. Focus on the \
            shipments tables and make sure every shipment is tracked correctly. Create shipments \
            only through the 'send_shipment' function, never with raw INSERT statements. \
            Retrieve schema information with 'get_schema_info' before writing queries against \
            unfamiliar tables.",
        functions: &["query_shipment", "send_shipment", "get_schema_info"],
    }
}

pub fn crm_agent() -> AgentProfile {
    AgentProfile {
        name: "CRMAgent",
        description: "Manages customer and product information in the CRM database.",
        system_message: "Your role is to work with the CRM database. Use 'query_crm' for SELECT \
            queries, written as plain PostgreSQL without code fences. Focus on the customers and \
            product tables. Add customers only through the 'add_customer' function, never with \
            raw INSERT statements. Retrieve schema information with 'get_schema_info' before \
            writing queries against unfamiliar tables.",
        functions: &["query_crm", "add_customer", "get_schema_info"],
    }
}

pub fn schema_agent() -> AgentProfile {
    AgentProfile {
        name: "SchemaAgent",
        description: "Understands and shares database schema information.",
        system_message: "Your role is to retrieve and explain database schema and referential \
            integrity constraints. Only use 'get_schema_info'; the snapshot is cached for the \
            session, so repeated requests are cheap. Provide schema information before other \
            agents write their queries.",
        functions: &["get_schema_info"],
    }
}

pub fn all_profiles() -> Vec<AgentProfile> {
    vec![schema_agent(), shipment_agent(), crm_agent()]
}

#[cfg(test)]
mod tests {
    use super::all_profiles;

    #[test]
    fn every_profile_declares_at_least_one_function() {
        for profile in all_profiles() {
            assert!(!profile.functions.is_empty(), "{} has no functions", profile.name);
            assert!(!profile.system_message.trim().is_empty());
        }
    }

    #[test]
    fn profile_names_are_unique() {
        let profiles = all_profiles();
        for (index, profile) in profiles.iter().enumerate() {
            assert!(
                profiles[index + 1..].iter().all(|other| other.name != profile.name),
                "duplicate profile name {}",
                profile.name
            );
        }
    }
}
