use crate::{AttributeValue, Attributes};

/// Subject being evaluated. Exposes the caller's attributes augmented with an implicit `id`
/// attribute equal to the subject key, unless the caller supplied their own `id`.
pub(super) struct Subject<'a> {
    key: &'a str,
    attributes: &'a Attributes,
    id: AttributeValue,
}

impl<'a> Subject<'a> {
    pub(super) fn new(key: &'a str, attributes: &'a Attributes) -> Subject<'a> {
        Subject {
            key,
            attributes,
            id: AttributeValue::String(key.to_owned()),
        }
    }

    pub(super) fn key(&self) -> &'a str {
        self.key
    }

    pub(super) fn attributes(&self) -> &'a Attributes {
        self.attributes
    }

    pub(super) fn get_attribute(&self, name: &str) -> Option<&AttributeValue> {
        let value = self.attributes.get(name);
        match value {
            None if name == "id" => Some(&self.id),
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Subject;
    use crate::AttributeValue;

    #[test]
    fn implicit_id_attribute() {
        let attributes = HashMap::new();
        let subject = Subject::new("alice", &attributes);
        assert_eq!(
            subject.get_attribute("id"),
            Some(&AttributeValue::from("alice"))
        );
        assert_eq!(subject.get_attribute("email"), None);
    }

    #[test]
    fn caller_supplied_id_wins() {
        let attributes = HashMap::from([("id".to_owned(), AttributeValue::from("custom"))]);
        let subject = Subject::new("alice", &attributes);
        assert_eq!(
            subject.get_attribute("id"),
            Some(&AttributeValue::from("custom"))
        );
    }
}
