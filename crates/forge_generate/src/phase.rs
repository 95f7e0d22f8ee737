//! Generation phases and their prompts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters of each code artifact passed to the tests phase.
const TESTS_EXCERPT: usize = 2000;
/// Characters of the combined code passed to the review phase.
const REVIEW_EXCERPT: usize = 3000;

/// One ordered stage of the generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Architecture,
    Frontend,
    Backend,
    Tests,
    Review,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Architecture,
        Phase::Frontend,
        Phase::Backend,
        Phase::Tests,
        Phase::Review,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Tests => "tests",
            Self::Review => "review",
        }
    }

    fn role(&self) -> &'static str {
        match self {
            Self::Architecture => {
                "You are a senior software architect. Your role is to:
1. Analyze the requirements and create a high-level architecture
2. Define the technology stack and project structure
3. Identify key components and their relationships
4. Plan the development phases
5. Ensure scalability and maintainability

Focus on creating a solid foundation for the application."
            }
            Self::Frontend => {
                "You are a senior frontend developer specializing in React and TypeScript. Your role is to:
1. Create modern, responsive user interfaces
2. Implement component-based architecture
3. Ensure accessibility and user experience
4. Use modern React patterns (hooks, context, etc.)
5. Implement proper state management
6. Add animations and interactions

Focus on creating beautiful, functional user interfaces."
            }
            Self::Backend => {
                "You are a senior backend developer. Your role is to:
1. Design and implement API endpoints
2. Handle data validation and sanitization
3. Implement authentication and authorization
4. Design database schemas and relationships
5. Add proper error handling and logging
6. Ensure security best practices

Focus on creating robust, secure backend services."
            }
            Self::Tests => {
                "You are a senior QA engineer. Your role is to:
1. Write comprehensive unit tests
2. Create integration tests
3. Implement end-to-end tests
4. Add test utilities and helpers
5. Ensure good test coverage
6. Set up testing infrastructure

Focus on creating reliable, maintainable test suites."
            }
            Self::Review => {
                "You are a senior code reviewer. Your role is to:
1. Review code for quality and best practices
2. Identify potential issues and improvements
3. Ensure code follows standards and conventions
4. Check for security vulnerabilities
5. Verify performance optimizations
6. Ensure documentation is complete

Focus on maintaining high code quality standards."
            }
        }
    }

    fn deliverables(&self) -> &'static str {
        match self {
            Self::Architecture => {
                "Please create a comprehensive architecture plan including:
1. Technology stack selection
2. Project structure
3. Component architecture
4. Data flow design
5. API design
6. Database schema
7. Security considerations
8. Performance optimizations
9. Deployment strategy
10. Development phases

Provide detailed specifications that other agents can follow."
            }
            Self::Frontend => {
                "Please create the complete frontend application including:
1. React components with TypeScript
2. Modern UI with Tailwind CSS
3. State management setup
4. Routing configuration
5. Form handling and validation
6. API integration
7. Error boundaries
8. Loading states
9. Responsive design
10. Accessibility features

Generate complete, production-ready frontend code."
            }
            Self::Backend => {
                "Please create the complete backend application including:
1. API endpoints with proper HTTP methods
2. Database models and migrations
3. Authentication and authorization
4. Input validation and sanitization
5. Error handling and logging
6. Security middleware
7. Rate limiting
8. CORS configuration
9. Environment configuration
10. Documentation

Generate complete, production-ready backend code."
            }
            Self::Tests => {
                "Please create comprehensive test suites including:
1. Unit tests for all components and functions
2. Integration tests for API endpoints
3. End-to-end tests for user workflows
4. Test utilities and helpers
5. Mock data and fixtures
6. Test configuration files
7. Coverage reporting setup
8. Performance tests
9. Security tests
10. Accessibility tests

Generate complete, production-ready test code."
            }
            Self::Review => {
                "Please review the generated code and provide:
1. Code quality assessment
2. Security vulnerability analysis
3. Performance optimization suggestions
4. Best practices compliance
5. Documentation completeness
6. Error handling review
7. Accessibility compliance
8. SEO considerations
9. Browser compatibility
10. Final recommendations

Provide a comprehensive code review."
            }
        }
    }

    /// Build this phase's prompt from the request and earlier artifacts.
    pub fn build_prompt(
        &self,
        request: &str,
        context: &serde_json::Value,
        artifacts: &BTreeMap<Phase, String>,
    ) -> String {
        let artifact = |phase: Phase| artifacts.get(&phase).map(String::as_str).unwrap_or("");

        let inputs = match self {
            Self::Architecture => {
                let context = serde_json::to_string_pretty(context).unwrap_or_default();
                format!("Requirements: {}\n\nContext: {}", request, context)
            }
            Self::Frontend | Self::Backend => {
                format!("Architecture: {}", artifact(Phase::Architecture))
            }
            Self::Tests => format!(
                "Frontend Code: {}...\nBackend Code: {}...",
                excerpt(artifact(Phase::Frontend), TESTS_EXCERPT),
                excerpt(artifact(Phase::Backend), TESTS_EXCERPT)
            ),
            Self::Review => {
                let all_code = [Phase::Frontend, Phase::Backend, Phase::Tests]
                    .into_iter()
                    .map(artifact)
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!("Generated Code: {}...", excerpt(&all_code, REVIEW_EXCERPT))
            }
        };

        format!("\n{}\n\n{}\n\n{}\n", self.role(), inputs, self.deliverables())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First `limit` characters of `text`.
fn excerpt(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
