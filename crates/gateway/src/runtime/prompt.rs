//! LLM input assembly.

use pc_domain::document::Document;
use pc_domain::message::Message;
use pc_domain::principal::Profile;

/// Build the completion input: one system message followed by the user
/// message.
///
/// The system message is the system prompt, then a `Context documents`
/// section with each document's content (omitted when there are none),
/// then the user's first name when known.
pub fn assemble_llm_input(
    system_prompt: &str,
    user_prompt: &str,
    documents: &[Document],
    profile: &Profile,
) -> Vec<Message> {
    let mut system = system_prompt.trim_end().to_string();

    if !documents.is_empty() {
        system.push_str("\n\nContext documents:");
        for (i, doc) in documents.iter().enumerate() {
            system.push_str(&format!("\n[{}] {}", i + 1, doc.content.trim()));
        }
    }

    if let Some(name) = profile.first_name.as_deref().filter(|n| !n.is_empty()) {
        system.push_str(&format!("\n\nThe user's first name is {name}."));
    }

    vec![Message::system(system), Message::user(user_prompt)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_domain::message::Role;

    fn doc(id: &str, content: &str) -> Document {
        Document {
            id: id.into(),
            content: content.into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn without_documents_or_name_is_prompt_only() {
        let msgs = assemble_llm_input("Be brief.", "hi", &[], &Profile::default());
        assert_eq!(msgs, vec![Message::system("Be brief."), Message::user("hi")]);
    }

    #[test]
    fn documents_are_numbered_in_order() {
        let docs = [doc("a", "PTO is 20 days."), doc("b", "Office closes at 6.")];
        let msgs = assemble_llm_input("Be brief.", "q", &docs, &Profile::default());
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(
            msgs[0].content,
            "Be brief.\n\nContext documents:\n[1] PTO is 20 days.\n[2] Office closes at 6."
        );
    }

    #[test]
    fn first_name_is_appended_last() {
        let profile = Profile {
            first_name: Some("Alice".into()),
            last_name: None,
        };
        let msgs = assemble_llm_input("S", "q", &[doc("a", "D")], &profile);
        assert!(msgs[0]
            .content
            .ends_with("[1] D\n\nThe user's first name is Alice."));
        assert_eq!(msgs[1].content, "q");
    }
}
