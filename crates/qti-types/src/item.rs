use crate::{Identifier, Rule, VariableDeclaration, VariableKind};

/// A parsed assessment item: its variable declarations and response
/// processing rules.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentItem {
    pub identifier: Identifier,
    pub declarations: Vec<VariableDeclaration>,
    pub response_processing: Vec<Rule>,
}

impl AssessmentItem {
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            declarations: Vec::new(),
            response_processing: Vec::new(),
        }
    }

    pub fn with_declaration(mut self, declaration: VariableDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.response_processing = rules;
        self
    }

    pub fn declaration(&self, identifier: &Identifier) -> Option<&VariableDeclaration> {
        self.declarations
            .iter()
            .find(|d| &d.identifier == identifier)
    }

    pub fn declarations_of(&self, kind: VariableKind) -> impl Iterator<Item = &VariableDeclaration> {
        self.declarations.iter().filter(move |d| d.kind == kind)
    }
}
